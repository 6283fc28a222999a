use csv_pick::{
    ColspecError, CompiledSpec, EvalexprEngine, HeaderMap, MetadataField, SelectorKind,
};

fn header(names: &[&str]) -> HeaderMap {
    HeaderMap::from_headers(names)
}

fn kinds(text: &str, headers: Option<&HeaderMap>) -> Vec<SelectorKind> {
    CompiledSpec::compile(text, headers, &EvalexprEngine)
        .expect("compile colspec")
        .entries()
        .iter()
        .map(|entry| entry.kind())
        .collect()
}

#[test]
fn tokens_keep_their_written_order() {
    let map = header(&["id", "name", "age"]);
    assert_eq!(
        kinds("%,age,0,name-age,*,_csv_columns", Some(&map)),
        vec![
            SelectorKind::Complement,
            SelectorKind::Index(2),
            SelectorKind::Index(0),
            SelectorKind::Range { start: 1, stop: 3 },
            SelectorKind::All,
            SelectorKind::Metadata(MetadataField::ColumnCount),
        ]
    );
}

#[test]
fn duplicate_header_names_resolve_to_first_position() {
    let map = header(&["x", "y", "x"]);
    assert_eq!(kinds("x", Some(&map)), vec![SelectorKind::Index(0)]);
}

#[test]
fn numeric_tokens_win_over_numeric_header_names() {
    let map = header(&["2", "1", "0"]);
    assert_eq!(kinds("0", Some(&map)), vec![SelectorKind::Index(0)]);
}

#[test]
fn hyphenated_names_can_form_ranges() {
    let map = header(&["first-name", "middle", "last-name"]);
    assert_eq!(
        kinds("first-name-last-name", Some(&map)),
        vec![SelectorKind::Range { start: 0, stop: 3 }]
    );
    assert_eq!(kinds("last-name", Some(&map)), vec![SelectorKind::Index(2)]);
}

#[test]
fn names_without_header_mode_are_unresolved() {
    let err = CompiledSpec::compile("0,name", None, &EvalexprEngine).unwrap_err();
    assert_eq!(
        err,
        ColspecError::UnresolvedName {
            name: "name".to_string()
        }
    );
}

#[test]
fn colspec_must_be_a_single_record() {
    let err = CompiledSpec::compile("0,1\n2", None, &EvalexprEngine).unwrap_err();
    assert!(matches!(err, ColspecError::MalformedSpec { .. }));
}

#[test]
fn quoted_tokens_protect_filter_commas() {
    let spec = CompiledSpec::compile(
        "\"0|regex_replace(value, \"\"[0-9]\"\", \"\"#\"\")\"",
        None,
        &EvalexprEngine,
    )
    .unwrap();
    assert_eq!(spec.len(), 1);
    assert_eq!(
        spec.describe()[0].filter,
        Some("regex_replace(value, \"[0-9]\", \"#\")")
    );
}
