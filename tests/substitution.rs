use std::fs;

use aixm_uuid_subst::xref::is_uuid;
use aixm_uuid_subst::{
    Error, IdentifierMaps, SubstitutionParams, TableAnnotationOrder, extract_identifiers,
    pretty_print, run, substitute, substitute_with_order,
};

include!("common/aixm.rs");

fn params() -> SubstitutionParams {
    SubstitutionParams::new("2022-12-24T00:00:00Z".parse().expect("date"))
}

fn substitute_str(xml: &str, params: &SubstitutionParams, maps: &IdentifierMaps) -> String {
    let out = substitute(xml.as_bytes(), Vec::new(), params, maps).expect("substitute");
    String::from_utf8(out).expect("utf-8 output")
}

/// Alle `xlink:href` Werte in Dokumentreihenfolge.
fn hrefs(xml: &str) -> Vec<String> {
    xml.split("xlink:href=\"")
        .skip(1)
        .filter_map(|rest| rest.split_once('"').map(|(value, _)| value.to_string()))
        .collect()
}

#[test]
fn pass1_assigns_distinct_uuids() {
    let maps = extract_identifiers(sample_message().as_bytes()).expect("pass 1");

    let keys: Vec<&str> = maps.identifiers.keys().map(String::as_str).collect();
    assert_eq!(keys, vec![AIRSPACE_ID, ORGANISATION_ID, UNIT_ID]);

    let mut values: Vec<&String> = maps.identifiers.values().collect();
    assert!(values.iter().all(|v| is_uuid(v)));
    values.sort();
    values.dedup();
    assert_eq!(values.len(), 3, "new identifiers must be pairwise distinct");

    assert_eq!(maps.gml_id_exceptions.len(), 1);
    let new_org = maps.lookup(ORGANISATION_ID).expect("organisation mapped");
    assert_eq!(maps.gml_id_exceptions.get("ORG_1"), Some(&format!("uuid.{new_org}")));
    assert!(maps.lookup("metadata-only-marker").is_none());
}

#[test]
fn pass2_rewrites_identity_and_revision() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    for old in [AIRSPACE_ID, ORGANISATION_ID, UNIT_ID] {
        let new = maps.lookup(old).expect("mapped");
        assert!(!out.contains(old), "{old} still present");
        assert!(out.contains(&format!("gml:id=\"uuid.{new}\"")));
        assert!(out.contains(&format!(">{new}</gml:identifier>")));
    }

    assert_eq!(count(&out, "<aixm:sequenceNumber>1</aixm:sequenceNumber>"), 3);
    assert_eq!(count(&out, "<aixm:correctionNumber>0</aixm:correctionNumber>"), 3);
    assert_eq!(
        count(&out, "<gml:beginPosition>2022-12-24T00:00:00Z</gml:beginPosition>"),
        3
    );
    assert!(out.contains("<aixm:name>AUTHORITY &amp; CO</aixm:name>"));
}

#[test]
fn pass2_keeps_highest_revision_only() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    assert_eq!(count(&out, "<aixm:timeSlice>"), 3);
    assert!(out.contains("NEW-REVISION"));
    assert!(!out.contains("OLD-REVISION"));
}

#[test]
fn pass2_regenerates_nested_ids_by_default() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");

    let out = substitute_str(&xml, &params(), &maps);
    for old in ["ASE_TS_NEW", "TP_NEW", "OA_TS", "UNIT_TP"] {
        assert!(!out.contains(old), "{old} not regenerated");
    }

    let kept = substitute_str(&xml, &params().with_regenerate_nested_ids(false), &maps);
    assert!(kept.contains("gml:id=\"ASE_TS_NEW\""));
    assert!(kept.contains("gml:id=\"TP_NEW\""));
}

#[test]
fn pass2_repairs_cross_references() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    let new_airspace = maps.lookup(AIRSPACE_ID).expect("airspace mapped");
    let new_org = maps.lookup(ORGANISATION_ID).expect("organisation mapped");
    assert_eq!(
        hrefs(&out),
        vec![
            format!("#uuid.{new_org}"),
            format!("urn:uuid:{new_airspace}"),
            format!("urn:uuid:{FOREIGN_ID}"),
            format!("#uuid.{new_airspace} and uuid.{FOREIGN_ID}"),
        ]
    );
}

#[test]
fn empty_maps_leave_references_untouched() {
    let xml = sample_message();
    let out = substitute_str(&xml, &params(), &IdentifierMaps::new());
    assert_eq!(hrefs(&out), hrefs(&xml));
    assert!(out.contains(&format!(">{AIRSPACE_ID}</gml:identifier>")));
}

#[test]
fn metadata_unit_is_not_written() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    assert!(!out.contains("messageMetadata"));
    assert!(!out.contains("metadata-only-marker"));
    assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<message:AIXMBasicMessage"));
    assert!(out.contains("gml:id=\"M1\""));
    assert_eq!(count(&out, "<message:hasMember>"), 3);
    assert!(out.ends_with("</message:AIXMBasicMessage>"));
}

#[test]
fn remark_replaces_placeholder_before_extension() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params().with_remark("converted"), &maps);

    assert!(!out.contains("xsi:nil"));
    assert_eq!(count(&out, "<aixm:annotation>"), 3);
    assert_eq!(count(&out, "<aixm:purpose>REMARK</aixm:purpose>"), 3);
    assert_eq!(count(&out, "<aixm:note>converted</aixm:note>"), 3);

    let annotation = out.find("<aixm:annotation>").expect("annotation");
    let extension = out.find("<aixm:extension>").expect("extension");
    let designator = out.find("NEW-REVISION").expect("designator");
    assert!(designator < annotation && annotation < extension);
}

#[test]
fn remark_follows_custom_order_table() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let order = TableAnnotationOrder::new().with("Unit", ["ownerOrganisation"]);
    let out = substitute_with_order(
        xml.as_bytes(),
        Vec::new(),
        &params().with_remark("r"),
        &maps,
        &order,
    )
    .expect("substitute");
    let out = String::from_utf8(out).expect("utf-8 output");

    let unit = out.find("<aixm:UnitTimeSlice").expect("unit slice");
    let annotation = unit + out[unit..].find("<aixm:annotation>").expect("annotation");
    let owner = out.find("<aixm:ownerOrganisation").expect("owner");
    assert!(annotation < owner);
    assert!(out[owner..].find("<aixm:annotation>").is_none());
}

#[test]
fn output_is_a_valid_pass1_input() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    let again = extract_identifiers(out.as_bytes()).expect("pass 1 on output");
    let expected: Vec<&String> = maps.identifiers.values().collect();
    let keys: Vec<&String> = again.identifiers.keys().collect();
    assert_eq!(keys, expected);
    assert!(again.gml_id_exceptions.is_empty());
}

#[test]
fn output_without_regeneration_is_deterministic() {
    let xml = sample_message();
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let p = params().with_regenerate_nested_ids(false);
    assert_eq!(substitute_str(&xml, &p, &maps), substitute_str(&xml, &p, &maps));
}

#[test]
fn unknown_top_level_child_is_malformed() {
    let xml = r#"<message:AIXMBasicMessage xmlns:message="http://www.aixm.aero/schema/5.1/message"><message:other/></message:AIXMBasicMessage>"#;
    let err = extract_identifiers(xml.as_bytes()).unwrap_err();
    assert!(matches!(err, Error::MalformedContainer { .. }), "{err}");
}

#[test]
fn empty_message_keeps_root() {
    let xml = r#"<message:AIXMBasicMessage xmlns:message="http://www.aixm.aero/schema/5.1/message"/>"#;
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    assert!(maps.is_empty());
    let out = substitute_str(xml, &params(), &maps);
    assert!(out.contains("<message:AIXMBasicMessage"));
    assert!(out.trim_end().ends_with("</message:AIXMBasicMessage>"));
}

#[test]
fn run_over_files_then_pretty_print() {
    let dir = tempfile::tempdir().expect("temp dir");
    let input = dir.path().join("in.xml");
    let output = dir.path().join("out.xml");
    fs::write(&input, sample_message()).expect("write input");

    let maps = run(&input, &output, &params().with_remark("file run")).expect("run");
    assert_eq!(maps.identifiers.len(), 3);

    let written = fs::read_to_string(&output).expect("read output");
    let mut pretty = Vec::new();
    pretty_print(written.as_bytes(), &mut pretty).expect("pretty");
    let pretty = String::from_utf8(pretty).expect("utf-8 output");
    assert!(pretty.contains("\n  <message:hasMember>\n    <aixm:Airspace"));
    assert_eq!(count(&pretty, "<aixm:note>file run</aixm:note>"), 3);
}

/// Feature ohne `uuid.` Konvention, optional mit Referenzen im Time Slice.
fn member(gml_id: &str, identifier: &str, refs: &[&str]) -> String {
    let links: String = refs
        .iter()
        .map(|r| format!("<aixm:ref xlink:href=\"{r}\"/>"))
        .collect();
    format!(
        r#"<message:hasMember><aixm:Unit gml:id="{gml_id}"><gml:identifier codeSpace="urn:uuid:">{identifier}</gml:identifier><aixm:timeSlice><aixm:UnitTimeSlice gml:id="{gml_id}_TS"><aixm:sequenceNumber>1</aixm:sequenceNumber><aixm:correctionNumber>0</aixm:correctionNumber>{links}</aixm:UnitTimeSlice></aixm:timeSlice></aixm:Unit></message:hasMember>"#
    )
}

fn message(members: &[String], member_attrs: &str) -> String {
    let body: String = members
        .iter()
        .map(|m| m.replacen("<message:hasMember>", &format!("<message:hasMember{member_attrs}>"), 1))
        .collect();
    format!(
        r#"<message:AIXMBasicMessage xmlns:message="http://www.aixm.aero/schema/5.1/message" xmlns:aixm="http://www.aixm.aero/schema/5.1" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:xlink="http://www.w3.org/1999/xlink" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">{body}</message:AIXMBasicMessage>"#
    )
}

#[test]
fn references_to_prefix_sharing_gml_ids_are_repaired() {
    const ONE: &str = "0a1b2c3d-0000-4000-8000-000000000001";
    const TEN: &str = "0a1b2c3d-0000-4000-8000-000000000010";
    const USER: &str = "0a1b2c3d-0000-4000-8000-000000000099";

    for ids in [["UNIT_1", "UNIT_10"], ["UNIT_10", "UNIT_1"]] {
        let (first, second) = if ids[0] == "UNIT_1" { (ONE, TEN) } else { (TEN, ONE) };
        let xml = message(
            &[
                member(ids[0], first, &[]),
                member(ids[1], second, &[]),
                member("USER", USER, &["#UNIT_10", "#UNIT_1", "#UNIT_1 #UNIT_10"]),
            ],
            "",
        );
        let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
        let out = substitute_str(&xml, &params(), &maps);

        let one = maps.lookup(ONE).expect("UNIT_1 mapped");
        let ten = maps.lookup(TEN).expect("UNIT_10 mapped");
        assert_eq!(
            hrefs(&out),
            vec![
                format!("#uuid.{ten}"),
                format!("#uuid.{one}"),
                format!("#uuid.{one} #uuid.{ten}"),
            ],
            "exception order {ids:?}"
        );
    }
}

#[test]
fn member_declarations_survive_for_qname_content() {
    let extension = r#"<aixm:extension xsi:type="ext:UnitExtension"/>"#;
    let unit = member("U", UNIT_ID, &[]).replace(
        "</aixm:UnitTimeSlice>",
        &format!("{extension}</aixm:UnitTimeSlice>"),
    );
    let xml = message(&[unit], r#" xmlns:ext="urn:ext""#);
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);

    assert!(out.contains(r#"<message:hasMember xmlns:ext="urn:ext">"#), "{out}");
    assert!(out.contains(extension), "{out}");
    assert_eq!(count(&out, "xmlns:ext="), 1);
}

#[test]
fn attribute_line_breaks_survive_a_second_pass() {
    let unit = member("U", UNIT_ID, &[]).replace(
        "<aixm:sequenceNumber>",
        r#"<aixm:note text="a&#10;b&#9;c"/><aixm:sequenceNumber>"#,
    );
    let xml = message(&[unit], "");
    let maps = extract_identifiers(xml.as_bytes()).expect("pass 1");
    let out = substitute_str(&xml, &params(), &maps);
    assert!(out.contains(r#"text="a&#10;b&#9;c""#), "{out}");

    let again = substitute_str(&out, &params(), &IdentifierMaps::new());
    assert!(again.contains(r#"text="a&#10;b&#9;c""#), "{again}");
}
