//! Certification orchestrator: the end-to-end issue and void flows.
//!
//! [`Certifier`] drives one document at a time through the configured
//! provider: normalize the invoice, serialize the provider dialect,
//! submit over the wire, parse the response, and write the outcome back
//! through the host's [`RecordSink`]. Provider outages become contingency
//! windows instead of errors; persistence failures become sticky
//! do-not-resubmit notices.

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{error, info, warn};

use crate::audit::FelLogEntry;
use crate::company::CompanyProfile;
use crate::contingency::ContingencyTracker;
use crate::core::{
    CertError, FelError, Invoice, NormalizeContext, escape_required, guatemala_now, normalize,
    strip_nit,
};
use crate::providers::{CancelOrder, ProviderAdapter, configured_adapter};
use crate::record::{DocumentState, DteRecord};
use crate::result::CertificationResult;
use crate::wire::{WireClient, WireFailure};

/// Advisory double-submission window in milliseconds. A record marked
/// in-process within this span blocks interactive resubmission.
pub const IN_PROCESS_WINDOW_MS: i64 = 10_100;

/// The window as a duration, for host-side guards.
pub fn in_process_window() -> TimeDelta {
    TimeDelta::milliseconds(IN_PROCESS_WINDOW_MS)
}

/// Default cancellation reason when the caller gives none.
const DEFAULT_CANCEL_REASON: &str = "Anulación";

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Host persistence for certification outcomes.
///
/// `apply` stores the record's new state; `log` appends one audit entry.
/// Both run after the wire call, so a failure here means the provider may
/// already hold a certified copy; the orchestrator flags the record and
/// raises [`FelError::Persistence`] so the operator does not resubmit.
pub trait RecordSink: Send {
    fn apply(&mut self, record: &DteRecord) -> Result<(), SinkError>;
    fn log(&mut self, entry: &FelLogEntry) -> Result<(), SinkError>;
}

/// Sink that collects write-backs in memory, for tests and short-lived
/// tooling.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<DteRecord>,
    pub entries: Vec<FelLogEntry>,
}

impl RecordSink for MemorySink {
    fn apply(&mut self, record: &DteRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn log(&mut self, entry: &FelLogEntry) -> Result<(), SinkError> {
        self.entries.push(entry.clone());
        Ok(())
    }
}

/// Shared handle so a test or caller can keep inspecting the sink while
/// the certifier owns it.
impl RecordSink for std::sync::Arc<std::sync::Mutex<MemorySink>> {
    fn apply(&mut self, record: &DteRecord) -> Result<(), SinkError> {
        self.lock()
            .map_err(|_| SinkError::from("record sink mutex poisoned"))?
            .apply(record)
    }

    fn log(&mut self, entry: &FelLogEntry) -> Result<(), SinkError> {
        self.lock()
            .map_err(|_| SinkError::from("record sink mutex poisoned"))?
            .log(entry)
    }
}

/// Outcome of a successful `issue` or `void` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Issuance {
    pub result: CertificationResult,
    /// References released for re-certification when this success closed
    /// a contingency window.
    pub released: Vec<String>,
}

/// The certification pipeline for one issuing company.
pub struct Certifier {
    company: CompanyProfile,
    tracker: ContingencyTracker,
    wire: WireClient,
    sink: Box<dyn RecordSink>,
}

impl Certifier {
    pub fn new(company: CompanyProfile, wire: WireClient, sink: Box<dyn RecordSink>) -> Self {
        Self {
            company,
            tracker: ContingencyTracker::new(),
            wire,
            sink,
        }
    }

    /// Resume with a tracker restored from host storage.
    pub fn with_tracker(mut self, tracker: ContingencyTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn company(&self) -> &CompanyProfile {
        &self.company
    }

    pub fn company_mut(&mut self) -> &mut CompanyProfile {
        &mut self.company
    }

    pub fn tracker(&self) -> &ContingencyTracker {
        &self.tracker
    }

    /// Certify one document.
    ///
    /// Validation and configuration problems raise before any wire call.
    /// An unreachable provider is not an error: the document is issued
    /// locally under an access number and the result carries it. A
    /// structured provider rejection raises [`FelError::ProviderRejected`]
    /// after the rejection detail has been logged through the sink.
    pub async fn issue(
        &mut self,
        record: &mut DteRecord,
        invoice: &Invoice,
    ) -> Result<Issuance, FelError> {
        let now = guatemala_now();
        if record.in_process_within(in_process_window(), now) {
            return Err(FelError::ConcurrentModification {
                documents: vec![record.reference.clone()],
            });
        }
        if record.is_certified() {
            return Err(FelError::Validation(format!(
                "document {} is already certified",
                record.reference
            )));
        }
        record.mark_in_process(now);
        let outcome = self.certify_record(record, invoice, now).await;
        record.clear_in_process();
        outcome
    }

    /// Certify a batch sequentially, one wire call at a time.
    ///
    /// Returns one flag per document: whether this call left it certified.
    /// Nothing raises; rejections and configuration problems are logged
    /// and reported as `false`, and already-certified documents are
    /// skipped. The in-process guard does not apply.
    pub async fn issue_all(&mut self, batch: &mut [(DteRecord, Invoice)]) -> Vec<bool> {
        let mut certified = Vec::with_capacity(batch.len());
        for (record, invoice) in batch.iter_mut() {
            if record.is_certified() {
                warn!(reference = %record.reference, "skipping already-certified document");
                certified.push(false);
                continue;
            }
            let now = guatemala_now();
            record.mark_in_process(now);
            let outcome = self.certify_record(record, invoice, now).await;
            record.clear_in_process();
            certified.push(match outcome {
                Ok(issuance) => issuance.result.success,
                Err(err) => {
                    warn!(reference = %record.reference, "batch certification failed: {err}");
                    false
                }
            });
        }
        certified
    }

    /// Cancel a certified document.
    ///
    /// Requires a recorded authorization uuid and certification date;
    /// fails with [`FelError::NothingToCancel`] before contacting any
    /// provider otherwise. `reason` defaults to a generic cancellation
    /// note and travels escaped in the provider request.
    pub async fn void(
        &mut self,
        record: &mut DteRecord,
        invoice: &Invoice,
        reason: Option<&str>,
    ) -> Result<Issuance, FelError> {
        let now = guatemala_now();
        self.check_sticky(record)?;
        let (uuid, certified_on) = match (record.fel_uuid.clone(), record.fel_date) {
            (Some(uuid), Some(date)) => (uuid, date),
            _ => return Err(FelError::NothingToCancel),
        };

        let adapter = configured_adapter(&self.company)?;
        adapter.check_credentials(&self.company)?;
        let policy = adapter.policy();

        let receiver_nit = strip_nit(invoice.receiver.nit.trim());
        if receiver_nit.is_empty() {
            return Err(FelError::MissingRequiredField {
                field: "receiver.nit".into(),
            });
        }
        let reason = escape_required(
            "cancel",
            "reason",
            reason.unwrap_or(DEFAULT_CANCEL_REASON),
            policy.escape_mode,
        )?;

        let order = CancelOrder {
            uuid: &uuid,
            series: record.fel_series.as_deref(),
            number: record.fel_number.as_deref(),
            certified_on,
            receiver_nit: &receiver_nit,
            reason: &reason,
            cancelled_at: now,
        };
        let request = match adapter.cancel_request(&order, &self.company) {
            Ok(request) => request,
            Err(FelError::ProviderRejected { errors }) => {
                // The provider has no online cancellation service; log the
                // rejection like any other and surface it.
                return Err(self.reject(record, CertificationResult::rejected(errors), now));
            }
            Err(other) => return Err(other),
        };

        info!(reference = %record.reference, provider = adapter.code().code(), uuid = %uuid,
            "submitting cancellation");
        let response = self.wire.send(&request).await?;
        let result = adapter.parse_cancel_response(&response.body);

        if result.success {
            record.state = DocumentState::Cancelled;
            record.cancel_uuid = result.uuid.clone();
            record.cancel_series = result.series.clone();
            record.cancel_number = result.number.clone();
            record.cancel_date = Some(result.certified_at.unwrap_or(now));
            if let Some(pdf) = self.fetch_pdf(adapter.as_ref(), &uuid).await {
                record.pdf_base64 = Some(pdf);
            }
            let entry = FelLogEntry::success(
                &record.reference,
                result.description.as_deref().unwrap_or("cancelled"),
                now,
            );
            self.write_back(record, vec![entry])?;
            info!(reference = %record.reference, "document cancelled");
            return Ok(Issuance {
                result,
                released: Vec::new(),
            });
        }
        Err(self.reject(record, result, now))
    }

    async fn certify_record(
        &mut self,
        record: &mut DteRecord,
        invoice: &Invoice,
        now: NaiveDateTime,
    ) -> Result<Issuance, FelError> {
        self.check_sticky(record)?;
        self.check_cf_restriction(invoice)?;

        let adapter = configured_adapter(&self.company)?;
        adapter.check_credentials(&self.company)?;
        let policy = adapter.policy();

        let resolved = self.resolve_receiver_name(invoice).await?;

        let key = adapter.key_identifier(
            record.key_identifier.as_deref(),
            &mut self.company,
            invoice.doc_type,
            now,
        );
        record.key_identifier = Some(key.clone());

        let ctx = NormalizeContext {
            company: &self.company,
            policy: &policy,
            key_identifier: &key,
            access_number: record.access_number,
            resolved_name: resolved.as_deref(),
            now,
        };
        let dte = normalize(invoice, &ctx)?;
        let xml = adapter.serialize(&dte)?;
        record.plain_xml = Some(xml.clone());

        let request = adapter.certify_request(&xml, &self.company)?;
        info!(reference = %record.reference, provider = adapter.code().code(),
            doc_type = invoice.doc_type.code(), "submitting document for certification");
        let result = match self
            .wire
            .dispatch(&request, &mut self.company.access_counter)
            .await
        {
            Ok(response) => adapter.parse_certify_response(&response.body),
            Err(WireFailure::Unreachable {
                access_number,
                message,
            }) => CertificationResult::unreachable(message, access_number),
            Err(WireFailure::Failed { message }) => CertificationResult::failed(message),
        };
        self.settle(record, adapter.as_ref(), result, now).await
    }

    async fn settle(
        &mut self,
        record: &mut DteRecord,
        adapter: &dyn ProviderAdapter,
        result: CertificationResult,
        now: NaiveDateTime,
    ) -> Result<Issuance, FelError> {
        if result.success {
            record.state = DocumentState::Certified;
            record.fel_uuid = result.uuid.clone();
            record.fel_series = result.series.clone();
            record.fel_number = result.number.clone();
            record.fel_date = Some(result.certified_at.unwrap_or(now));
            if result.signed_xml.is_some() {
                record.signed_xml = result.signed_xml.clone();
            }
            if result.certified_xml.is_some() {
                record.certified_xml = result.certified_xml.clone();
            }
            // A success on a contingent document closes the outage window
            // and releases everything filed under it.
            let released = if record.access_number.is_some() {
                self.tracker.close(now)
            } else {
                Vec::new()
            };
            if let Some(uuid) = record.fel_uuid.clone() {
                if let Some(pdf) = self.fetch_pdf(adapter, &uuid).await {
                    record.pdf_base64 = Some(pdf);
                }
            }
            record.clear_in_process();
            let entry = FelLogEntry::success(
                &record.reference,
                result.description.as_deref().unwrap_or("certified"),
                now,
            );
            self.write_back(record, vec![entry])?;
            info!(reference = %record.reference, uuid = record.fel_uuid.as_deref().unwrap_or(""),
                "document certified");
            return Ok(Issuance { result, released });
        }

        if let Some(access_number) = result.access_number {
            let description = result.description.clone().unwrap_or_default();
            record.access_number = Some(access_number);
            record.state = DocumentState::Contingency;
            record.clear_in_process();
            let window = self
                .tracker
                .open_or_extend(&record.reference, &description, now);
            let entry =
                FelLogEntry::failure(&record.reference, &CertError::new(&description), &description, now)
                    .under_window(window);
            self.write_back(record, vec![entry])?;
            warn!(reference = %record.reference, access_number, window,
                "provider unreachable, document issued under contingency");
            return Ok(Issuance {
                result,
                released: Vec::new(),
            });
        }

        record.clear_in_process();
        Err(self.reject(record, result, now))
    }

    /// Log an unsuccessful outcome and turn it into the error to raise.
    /// A write-back failure takes precedence over the provider error.
    fn reject(
        &mut self,
        record: &mut DteRecord,
        result: CertificationResult,
        now: NaiveDateTime,
    ) -> FelError {
        let window = self.tracker.open_window().map(|w| w.id);
        if !result.errors.is_empty() {
            let response = result.description.clone().unwrap_or_default();
            let entries: Vec<FelLogEntry> = result
                .errors
                .iter()
                .map(|error| {
                    let entry = FelLogEntry::failure(&record.reference, error, &response, now);
                    match window {
                        Some(id) => entry.under_window(id),
                        None => entry,
                    }
                })
                .collect();
            if let Err(err) = self.write_back(record, entries) {
                return err;
            }
            warn!(reference = %record.reference, errors = result.errors.len(),
                "provider rejected the document");
            return FelError::ProviderRejected {
                errors: result.errors,
            };
        }

        let message = result
            .description
            .unwrap_or_else(|| "the provider reported a failure without detail".into());
        let entry = FelLogEntry::failure(&record.reference, &CertError::new(&message), &message, now);
        let entry = match window {
            Some(id) => entry.under_window(id),
            None => entry,
        };
        if let Err(err) = self.write_back(record, vec![entry]) {
            return err;
        }
        FelError::TransportFailure { message }
    }

    fn check_sticky(&self, record: &DteRecord) -> Result<(), FelError> {
        if record.serialization_error {
            return Err(FelError::Persistence {
                message: format!(
                    "a previous write-back for {} failed; reconcile the record before resubmitting",
                    record.reference
                ),
            });
        }
        Ok(())
    }

    /// Consumer-final documents at or above the configured GTQ limit must
    /// carry a receiver NIT (Acuerdo Gubernativo 245-2022).
    fn check_cf_restriction(&self, invoice: &Invoice) -> Result<(), FelError> {
        let Some(limit) = self.company.amount_restrict_cf else {
            return Ok(());
        };
        if !invoice.receiver.nit.trim().eq_ignore_ascii_case("CF") {
            return Ok(());
        }
        let total = invoice.total_in_gtq();
        if total >= limit {
            return Err(FelError::Validation(format!(
                "a CF document totaling {total} GTQ needs the receiver NIT at or above {limit} GTQ \
                 (Acuerdo Gubernativo 245-2022)"
            )));
        }
        Ok(())
    }

    /// Resolve the receiver's registered name when the id is a real NIT
    /// and a registry service is configured.
    async fn resolve_receiver_name(&self, invoice: &Invoice) -> Result<Option<String>, FelError> {
        let receiver = &invoice.receiver;
        if !receiver.vat_registered || receiver.nit.trim().eq_ignore_ascii_case("CF") {
            return Ok(None);
        }
        let Some(config) = &self.company.nit_service else {
            return Ok(None);
        };
        let name = crate::nit::lookup_nit(config, &receiver.nit).await?;
        Ok(Some(name))
    }

    /// Fetch the provider-rendered PDF when the adapter exposes one.
    /// Retrieval problems are logged; they never fail the operation.
    async fn fetch_pdf(&self, adapter: &dyn ProviderAdapter, uuid: &str) -> Option<String> {
        let request = adapter.pdf_request(uuid, &self.company)?;
        match self.wire.send(&request).await {
            Ok(response) => {
                let pdf = adapter.parse_pdf_response(&response.body);
                if pdf.is_none() {
                    warn!(uuid, "PDF retrieval returned no document");
                }
                pdf
            }
            Err(err) => {
                warn!(uuid, "PDF retrieval failed: {err}");
                None
            }
        }
    }

    fn write_back(
        &mut self,
        record: &mut DteRecord,
        entries: Vec<FelLogEntry>,
    ) -> Result<(), FelError> {
        let mut outcome = self.sink.apply(record);
        if outcome.is_ok() {
            for entry in &entries {
                outcome = self.sink.log(entry);
                if outcome.is_err() {
                    break;
                }
            }
        }
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => {
                record.serialization_error = true;
                error!(reference = %record.reference, "result write-back failed: {err}");
                Err(FelError::Persistence {
                    message: format!(
                        "could not persist the result for {}; do not resubmit, the provider may \
                         already hold a certified copy: {err}",
                        record.reference
                    ),
                })
            }
        }
    }
}
