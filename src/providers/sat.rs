//! SAT `GTDocumento` serializer, shared by the providers that certify the
//! schema as published (Infile, Digifact, Contap, MegaPrint).

use crate::core::{Complement, Direccion, Dte, DteUse, FelError, NormalizePolicy, format_amount};

use super::xml::XmlWriter;

const SAT_NS: &str = "http://www.sat.gob.gt/dte/fel/0.2.0";
const CNO_NS: &str = "http://www.sat.gob.gt/face2/ComplementoReferenciaNota/0.1.0";
const CFC_NS: &str = "http://www.sat.gob.gt/dte/fel/CompCambiaria/0.1.0";
const CFE_NS: &str = "http://www.sat.gob.gt/face2/ComplementoFacturaEspecial/0.1.0";
const CEX_NS: &str = "http://www.sat.gob.gt/face2/ComplementoExportaciones/0.1.0";

/// Render a normalized document as an uncertified `GTDocumento`.
pub(crate) fn gt_documento(dte: &Dte, policy: &NormalizePolicy) -> Result<String, FelError> {
    let p = policy.precision;
    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "dte:GTDocumento",
        &[
            ("xmlns:dte", SAT_NS),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("Version", "0.1"),
        ],
    )?
    .start_element_with_attrs("dte:SAT", &[("ClaseDocumento", "dte")])?
    .start_element_with_attrs("dte:DTE", &[("ID", "DatosCertificados")])?
    .start_element_with_attrs("dte:DatosEmision", &[("ID", "DatosEmision")])?;

    let stamp = policy.stamp.render(dte.issued_at);
    let access = dte.access_number.map(|n| n.to_string());
    let mut generales: Vec<(&str, &str)> = vec![("Tipo", dte.doc_type.code())];
    if dte.use_kind == DteUse::Export {
        generales.push(("Exp", "SI"));
    }
    if let Some(number) = access.as_deref() {
        generales.push(("NumeroAcceso", number));
    }
    generales.push(("FechaHoraEmision", &stamp));
    generales.push(("CodigoMoneda", &dte.currency));
    w.empty_element_with_attrs("dte:DatosGenerales", &generales)?;

    let emisor = &dte.emisor;
    w.start_element_with_attrs(
        "dte:Emisor",
        &[
            ("AfiliacionIVA", emisor.regime.code()),
            ("CodigoEstablecimiento", &emisor.establishment_code),
            ("CorreoEmisor", &emisor.email),
            ("NITEmisor", &emisor.nit),
            ("NombreComercial", &emisor.trade_name),
            ("NombreEmisor", &emisor.legal_name),
        ],
    )?;
    address_block(&mut w, "dte:DireccionEmisor", &emisor.address)?;
    w.end_element("dte:Emisor")?;

    let receptor = &dte.receptor;
    let mut receptor_attrs: Vec<(&str, &str)> = vec![
        ("CorreoReceptor", &receptor.email),
        ("IDReceptor", &receptor.id),
        ("NombreReceptor", &receptor.name),
    ];
    if let Some(kind) = receptor.id_kind.as_deref().filter(|_| !receptor.vat_registered) {
        receptor_attrs.push(("TipoEspecial", kind));
    }
    w.start_element_with_attrs("dte:Receptor", &receptor_attrs)?;
    address_block(&mut w, "dte:DireccionReceptor", &receptor.address)?;
    w.end_element("dte:Receptor")?;

    if !dte.phrases.is_empty() {
        w.start_element("dte:Frases")?;
        for phrase in &dte.phrases {
            let resolution_date;
            let mut attrs: Vec<(&str, &str)> = vec![
                ("TipoFrase", &phrase.phrase_type),
                ("CodigoEscenario", &phrase.scenario_code),
            ];
            if let Some(number) = phrase.resolution_number.as_deref() {
                attrs.push(("NumeroResolucion", number));
            }
            if let Some(date) = phrase.resolution_date {
                resolution_date = date.format("%Y-%m-%d").to_string();
                attrs.push(("FechaResolucion", &resolution_date));
            }
            w.empty_element_with_attrs("dte:Frase", &attrs)?;
        }
        w.end_element("dte:Frases")?;
    }

    w.start_element("dte:Items")?;
    for item in &dte.items {
        let line = item.number.to_string();
        w.start_element_with_attrs(
            "dte:Item",
            &[("BienOServicio", item.kind.code()), ("NumeroLinea", &line)],
        )?
        .amount_element("dte:Cantidad", item.quantity, p)?
        .text_element("dte:UnidadMedida", &item.unit_of_measure)?
        .text_element("dte:Descripcion", &item.description)?
        .amount_element("dte:PrecioUnitario", item.unit_price, p)?
        .amount_element("dte:Precio", item.price, p)?
        .amount_element("dte:Descuento", item.discount, p)?;
        if !item.taxes.is_empty() {
            w.start_element("dte:Impuestos")?;
            for tax in &item.taxes {
                w.start_element("dte:Impuesto")?
                    .text_element("dte:NombreCorto", &tax.short_name)?
                    .text_element("dte:CodigoUnidadGravable", &tax.unit_code.to_string())?
                    .amount_element("dte:MontoGravable", tax.taxable, p)?
                    .amount_element("dte:MontoImpuesto", tax.amount, p)?
                    .end_element("dte:Impuesto")?;
            }
            w.end_element("dte:Impuestos")?;
        }
        w.amount_element("dte:Total", item.total, p)?
            .end_element("dte:Item")?;
    }
    w.end_element("dte:Items")?;

    w.start_element("dte:Totales")?;
    if !dte.tax_totals.is_empty() {
        w.start_element("dte:TotalImpuestos")?;
        for total in &dte.tax_totals {
            let amount = format_amount(total.amount, p);
            w.empty_element_with_attrs(
                "dte:TotalImpuesto",
                &[
                    ("NombreCorto", &total.short_name),
                    ("TotalMontoImpuesto", &amount),
                ],
            )?;
        }
        w.end_element("dte:TotalImpuestos")?;
    }
    w.amount_element("dte:GranTotal", dte.grand_total, p)?
        .end_element("dte:Totales")?;

    if !dte.complements.is_empty() {
        w.start_element("dte:Complementos")?;
        for complement in &dte.complements {
            write_complement(&mut w, complement, p)?;
        }
        w.end_element("dte:Complementos")?;
    }

    w.end_element("dte:DatosEmision")?.end_element("dte:DTE")?;

    if !dte.addenda.is_empty() {
        w.start_element("dte:Adenda")?;
        for addendum in &dte.addenda {
            w.text_element(&addendum.name, &addendum.value)?;
        }
        w.end_element("dte:Adenda")?;
    }

    w.end_element("dte:SAT")?.end_element("dte:GTDocumento")?;
    w.into_string()
}

fn address_block(w: &mut XmlWriter, name: &str, address: &Direccion) -> Result<(), FelError> {
    w.start_element(name)?
        .text_element("dte:Direccion", &address.street)?
        .text_element("dte:CodigoPostal", &address.postal_code)?
        .text_element("dte:Municipio", &address.municipality)?
        .text_element("dte:Departamento", &address.department)?
        .text_element("dte:Pais", &address.country)?;
    w.end_element(name)?;
    Ok(())
}

fn open_complement(w: &mut XmlWriter, name: &str, uri: &str) -> Result<(), FelError> {
    w.start_element_with_attrs(
        "dte:Complemento",
        &[
            ("IDComplemento", name),
            ("NombreComplemento", name),
            ("URIComplemento", uri),
        ],
    )?;
    Ok(())
}

fn write_complement(
    w: &mut XmlWriter,
    complement: &Complement,
    precision: u32,
) -> Result<(), FelError> {
    match complement {
        Complement::Note(note) => {
            open_complement(w, "ReferenciasNota", CNO_NS)?;
            let issued = note.origin_issued_on.format("%Y-%m-%d").to_string();
            let mut attrs: Vec<(&str, &str)> = vec![
                ("xmlns:cno", CNO_NS),
                ("Version", "0.0"),
                ("FechaEmisionDocumentoOrigen", &issued),
                ("MotivoAjuste", &note.reason),
                ("NumeroAutorizacionDocumentoOrigen", &note.origin_authorization),
                ("NumeroDocumentoOrigen", &note.origin_number),
                ("SerieDocumentoOrigen", &note.origin_series),
            ];
            if note.ancient {
                attrs.push(("RegimenAntiguo", "ANTIGUO"));
            }
            w.empty_element_with_attrs("cno:ReferenciasNota", &attrs)?
                .end_element("dte:Complemento")?;
        }
        Complement::Installment(installment) => {
            open_complement(w, "AbonosFacturaCambiaria", CFC_NS)?;
            let due = installment.due_date.format("%Y-%m-%d").to_string();
            w.start_element_with_attrs(
                "cfc:AbonosFacturaCambiaria",
                &[("xmlns:cfc", CFC_NS), ("Version", "0.1")],
            )?
            .start_element("cfc:Abono")?
            .text_element("cfc:NumeroAbono", &installment.number.to_string())?
            .text_element("cfc:FechaVencimiento", &due)?
            .amount_element("cfc:MontoAbono", installment.amount, precision)?
            .end_element("cfc:Abono")?
            .end_element("cfc:AbonosFacturaCambiaria")?
            .end_element("dte:Complemento")?;
        }
        Complement::SpecialRegime(regime) => {
            open_complement(w, "RetencionesFacturaEspecial", CFE_NS)?;
            w.start_element_with_attrs(
                "cfe:RetencionesFacturaEspecial",
                &[("xmlns:cfe", CFE_NS), ("Version", "0.1")],
            )?
            .amount_element("cfe:RetencionISR", regime.isr_withheld, precision)?
            .amount_element("cfe:RetencionIVA", regime.iva_withheld, precision)?
            .amount_element("cfe:TotalMenosRetenciones", regime.net_payable, precision)?
            .end_element("cfe:RetencionesFacturaEspecial")?
            .end_element("dte:Complemento")?;
        }
        Complement::Export(export) => {
            open_complement(w, "Exportacion", CEX_NS)?;
            w.start_element_with_attrs(
                "cex:Exportacion",
                &[("xmlns:cex", CEX_NS), ("Version", "0.1")],
            )?
            .text_element("cex:NombreConsignatarioODestinatario", &export.consignee_name)?
            .text_element(
                "cex:DireccionConsignatarioODestinatario",
                &export.consignee_address,
            )?
            .text_element("cex:CodigoConsignatarioODestinatario", &export.consignee_code)?
            .text_element("cex:NombreComprador", &export.buyer_name)?
            .text_element("cex:DireccionComprador", &export.buyer_address)?
            .text_element("cex:CodigoComprador", &export.buyer_code)?
            .text_element("cex:OtraReferencia", &export.origin_reference)?
            .text_element("cex:INCOTERM", &export.incoterm)?
            .text_element("cex:NombreExportador", &export.exporter_name)?
            .text_element("cex:CodigoExportador", &export.exporter_code)?
            .end_element("cex:Exportacion")?
            .end_element("dte:Complemento")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use crate::core::{
        Direccion, DteType, Emisor, IvaRegime, ItemKind, LineItem, LineTax, NoteReference, Phrase,
        Receptor, TaxTotal,
    };

    fn sample_dte() -> Dte {
        let address = Direccion::new("Guatemala", "01001", "Guatemala", "Guatemala", "GT");
        Dte {
            doc_type: DteType::Fact,
            currency: "GTQ".into(),
            issued_at: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap(),
            key_identifier: "abc123".into(),
            emisor: Emisor {
                nit: "1234567".into(),
                legal_name: "La Ceiba, S.A.".into(),
                trade_name: "La Ceiba".into(),
                email: "fel@laceiba.com.gt".into(),
                regime: IvaRegime::General,
                establishment_code: "1".into(),
                address: address.clone(),
            },
            receptor: Receptor {
                id: "CF".into(),
                name: "Consumidor Final".into(),
                email: String::new(),
                address: address.clone(),
                id_kind: None,
                vat_registered: false,
            },
            items: vec![LineItem {
                number: 1,
                kind: ItemKind::Goods,
                quantity: dec!(1),
                unit_of_measure: "UND".into(),
                description: "Machete 24&#34;".into(),
                unit_price: dec!(100),
                price: dec!(100),
                discount: dec!(0),
                total: dec!(100),
                taxes: vec![LineTax {
                    short_name: "IVA".into(),
                    unit_code: 1,
                    taxable: dec!(89.2857142857),
                    amount: dec!(10.7142857142),
                }],
                short_tax_name: None,
                municipal_code: None,
            }],
            tax_totals: vec![TaxTotal {
                short_name: "IVA".into(),
                taxable: dec!(89.2857142857),
                amount: dec!(10.7142857142),
            }],
            phrases: vec![Phrase::new("1", "1")],
            complements: Vec::new(),
            addenda: Vec::new(),
            access_number: None,
            grand_total: dec!(100),
            use_kind: DteUse::Local,
        }
    }

    #[test]
    fn renders_the_sat_envelope() {
        let dte = sample_dte();
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(
            "<dte:GTDocumento xmlns:dte=\"http://www.sat.gob.gt/dte/fel/0.2.0\" \
             xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" Version=\"0.1\">"
        ));
        assert!(xml.contains(
            "<dte:DatosGenerales Tipo=\"FACT\" FechaHoraEmision=\"2024-03-05T10:30:00-06:00\" \
             CodigoMoneda=\"GTQ\"/>"
        ));
        assert!(xml.contains("NITEmisor=\"1234567\""));
        assert!(xml.contains("<dte:Frase TipoFrase=\"1\" CodigoEscenario=\"1\"/>"));
        assert!(xml.contains("<dte:Descripcion>Machete 24&#34;</dte:Descripcion>"));
        assert!(xml.contains("<dte:MontoGravable>89.2857142857</dte:MontoGravable>"));
        assert!(xml.contains(
            "<dte:TotalImpuesto NombreCorto=\"IVA\" TotalMontoImpuesto=\"10.7142857142\"/>"
        ));
        assert!(xml.contains("<dte:GranTotal>100.00</dte:GranTotal>"));
        assert!(xml.ends_with("</dte:SAT></dte:GTDocumento>"));
    }

    #[test]
    fn contingency_and_export_ride_as_attributes() {
        let mut dte = sample_dte();
        dte.use_kind = DteUse::Export;
        dte.access_number = Some(15);
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        assert!(xml.contains(
            "<dte:DatosGenerales Tipo=\"FACT\" Exp=\"SI\" NumeroAcceso=\"15\" \
             FechaHoraEmision=\"2024-03-05T10:30:00-06:00\" CodigoMoneda=\"GTQ\"/>"
        ));
    }

    #[test]
    fn special_id_kind_becomes_tipo_especial() {
        let mut dte = sample_dte();
        dte.receptor.id = "2987654320101".into();
        dte.receptor.id_kind = Some("CUI".into());
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        assert!(xml.contains("TipoEspecial=\"CUI\""));
    }

    #[test]
    fn note_reference_complement_is_attribute_only() {
        let mut dte = sample_dte();
        dte.doc_type = DteType::Ncre;
        dte.complements.push(Complement::Note(NoteReference {
            ancient: false,
            reason: "Anulaci&#243;n".into(),
            origin_issued_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            origin_series: "A1B2".into(),
            origin_authorization: "11111111-2222-3333-4444-555555555555".into(),
            origin_number: "987".into(),
        }));
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        assert!(xml.contains(
            "<dte:Complemento IDComplemento=\"ReferenciasNota\" \
             NombreComplemento=\"ReferenciasNota\" \
             URIComplemento=\"http://www.sat.gob.gt/face2/ComplementoReferenciaNota/0.1.0\">"
        ));
        assert!(xml.contains("MotivoAjuste=\"Anulaci&#243;n\""));
        assert!(xml.contains("SerieDocumentoOrigen=\"A1B2\"/>"));
        assert!(!xml.contains("RegimenAntiguo"));
    }

    #[test]
    fn ancient_notes_carry_the_old_regime_marker() {
        let mut dte = sample_dte();
        dte.doc_type = DteType::Ncre;
        dte.complements.push(Complement::Note(NoteReference {
            ancient: true,
            reason: "Devoluci&#243;n".into(),
            origin_issued_on: NaiveDate::from_ymd_opt(2018, 6, 1).unwrap(),
            origin_series: "B".into(),
            origin_authorization: "123456789".into(),
            origin_number: "55".into(),
        }));
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        assert!(xml.contains("RegimenAntiguo=\"ANTIGUO\""));
    }

    #[test]
    fn addenda_follow_the_certified_body() {
        let mut dte = sample_dte();
        dte.addenda.push(crate::core::Addendum {
            name: "Vendedor".into(),
            value: "Juan P&#233;rez".into(),
        });
        let xml = gt_documento(&dte, &NormalizePolicy::standard()).unwrap();
        let adenda = xml.find("<dte:Adenda>").unwrap();
        let dte_close = xml.find("</dte:DTE>").unwrap();
        assert!(adenda > dte_close);
        assert!(xml.contains("<Vendedor>Juan P&#233;rez</Vendedor>"));
    }
}
