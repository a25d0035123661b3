//! Schema level tests: document merging, multiple schemas, cross-schema
//! references, platforms and namespaces.

use commsdsl::{DslError, Logger, LoggerConfig, Protocol, ProtocolConfig, SchemaId, Severity};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

fn capturing(config: ProtocolConfig) -> (Protocol, Rc<RefCell<Vec<commsdsl::Diagnostic>>>) {
    let (logger, diags) = Logger::capturing(config.logger);
    (Protocol::with_logger(config, logger), diags)
}

fn multi() -> ProtocolConfig {
    ProtocolConfig {
        multiple_schemas_enabled: true,
        ..Default::default()
    }
}

fn has_message(diags: &Rc<RefCell<Vec<commsdsl::Diagnostic>>>, text: &str) -> bool {
    diags.borrow().iter().any(|d| d.message.contains(text))
}

// ==================== single schema ====================

#[test]
fn header_properties() {
    let (mut p, _) = capturing(ProtocolConfig::default());
    p.parse_str(
        r#"<schema name="demo" id="3" version="4" dslVersion="5" endian="little" description="Demo" />"#,
        "demo.xml",
    )
    .unwrap();
    p.validate().unwrap();
    let s = p.schema(SchemaId(0));
    assert_eq!(s.name(), "demo");
    assert_eq!(s.props.id, 3);
    assert_eq!(s.props.version, 4);
    assert_eq!(s.props.dsl_version, 5);
    assert_eq!(s.props.description, "Demo");
    assert_eq!(p.schema_by_name("demo"), Some(SchemaId(0)));
}

#[test]
fn files_on_disk_merge_into_one_schema() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.xml");
    let second = dir.path().join("second.xml");
    std::fs::File::create(&first)
        .unwrap()
        .write_all(br#"<schema name="demo" version="2"><ns name="a"><int name="X" type="uint8" /></ns></schema>"#)
        .unwrap();
    std::fs::File::create(&second)
        .unwrap()
        .write_all(br#"<schema><ns name="a"><int name="Y" type="uint16" /></ns></schema>"#)
        .unwrap();

    let (mut p, _) = capturing(ProtocolConfig::default());
    p.parse(&first).unwrap();
    p.parse(&second).unwrap();
    p.validate().unwrap();
    assert_eq!(p.schemas().len(), 1);
    assert!(p.find_field("a.X").is_some());
    assert!(p.find_field("a.Y").is_some());
    assert!(p.find_field("a.Z").is_none());
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut p, _) = capturing(ProtocolConfig::default());
    assert!(matches!(p.parse(dir.path().join("absent.xml")), Err(DslError::Io(_))));
}

#[test]
fn malformed_xml_is_rejected() {
    let (mut p, _) = capturing(ProtocolConfig::default());
    assert!(p.parse_str("<schema name='x'><int name='A'", "bad.xml").is_err());
}

#[test]
fn root_element_must_be_schema() {
    let (mut p, _) = capturing(ProtocolConfig::default());
    p.parse_str("<protocol name='x' />", "bad.xml").unwrap();
    assert!(p.validate().is_err());
}

#[test]
fn duplicate_field_in_namespace() {
    let (mut p, diags) = capturing(ProtocolConfig::default());
    p.parse_str(
        r#"<schema name="demo"><int name="A" type="uint8" /><int name="A" type="uint16" /></schema>"#,
        "dup.xml",
    )
    .unwrap();
    assert!(p.validate().is_err());
    assert!(has_message(&diags, "has been already defined"));
}

#[test]
fn nested_namespaces_resolve() {
    let (mut p, _) = capturing(ProtocolConfig::default());
    p.parse_str(
        r#"<schema name="demo">
             <ns name="outer">
               <ns name="inner">
                 <int name="Leaf" type="uint32" />
               </ns>
               <ref name="R" field="outer.inner.Leaf" />
             </ns>
           </schema>"#,
        "ns.xml",
    )
    .unwrap();
    p.validate().unwrap();
    let reg = p.registry();
    let r = reg.field(p.find_field("outer.R").unwrap());
    assert_eq!(r.min_length(reg), 4);
    assert_eq!(r.max_length(reg), 4);
}

#[test]
fn platforms_are_collected() {
    let (mut p, diags) = capturing(ProtocolConfig::default());
    p.parse_str(
        r#"<schema name="demo">
             <platforms><platform name="Linux" /><platform name="Bare" /></platforms>
             <platform name="Linux" />
           </schema>"#,
        "platforms.xml",
    )
    .unwrap();
    p.validate().unwrap();
    assert_eq!(p.schema(SchemaId(0)).platforms, ["Bare", "Linux"]);
    assert!(has_message(&diags, "defined more than once"));
}

#[test]
fn invalid_platform_name() {
    let (mut p, _) = capturing(ProtocolConfig::default());
    p.parse_str(r#"<schema name="demo"><platform name="a-b" /></schema>"#, "p.xml")
        .unwrap();
    assert!(p.validate().is_err());
}

// ==================== multiple schemas ====================

#[test]
fn cross_schema_reference() {
    let (mut p, _) = capturing(multi());
    p.parse_str(
        r#"<schema name="A" dslVersion="5"><ns name="Foo"><int name="Bar" type="uint16" /></ns></schema>"#,
        "a.xml",
    )
    .unwrap();
    p.parse_str(
        r#"<schema name="B" dslVersion="5"><ref name="R" field="@A.Foo.Bar" /></schema>"#,
        "b.xml",
    )
    .unwrap();
    p.validate().unwrap();
    assert_eq!(p.protocol_schema(), Some(SchemaId(1)));

    // Unprefixed lookups happen in the protocol schema.
    assert!(p.find_field("R").is_some());
    assert!(p.find_field("Foo.Bar").is_none());
    assert!(p.find_field("@A.Foo.Bar").is_some());
    assert!(p.find_field("@B.R").is_some());
    assert!(p.find_field("@C.R").is_none());

    let reg = p.registry();
    let r = reg.field(p.find_field("R").unwrap());
    assert_eq!(r.non_ref(reg).name(), "Bar");
}

#[test]
fn multiple_schemas_disabled() {
    let (mut p, diags) = capturing(ProtocolConfig::default());
    p.parse_str(r#"<schema name="A" dslVersion="5" />"#, "a.xml").unwrap();
    p.parse_str(r#"<schema name="B" dslVersion="5" />"#, "b.xml").unwrap();
    assert!(p.validate().is_err());
    assert!(!diags.borrow().is_empty());
}

#[test]
fn multiple_schemas_need_dsl_support() {
    let (mut p, _) = capturing(multi());
    p.parse_str(r#"<schema name="A" dslVersion="4" />"#, "a.xml").unwrap();
    p.parse_str(r#"<schema name="B" dslVersion="4" />"#, "b.xml").unwrap();
    assert!(p.validate().is_err());
}

#[test]
fn returning_to_earlier_schema_name() {
    let (mut p, _) = capturing(multi());
    p.parse_str(r#"<schema name="A" dslVersion="5"><int name="X" type="uint8" /></schema>"#, "a.xml")
        .unwrap();
    p.parse_str(r#"<schema name="B" dslVersion="5" />"#, "b.xml").unwrap();
    p.parse_str(r#"<schema name="A"><int name="Y" type="uint8" /></schema>"#, "a2.xml")
        .unwrap();
    p.validate().unwrap();
    assert_eq!(p.schemas().len(), 2);
    assert!(p.find_field("@A.X").is_some());
    assert!(p.find_field("@A.Y").is_some());
}

// ==================== diagnostics ====================

#[test]
fn warnings_as_errors() {
    let config = ProtocolConfig {
        multiple_schemas_enabled: false,
        logger: LoggerConfig {
            min_level: Severity::Info,
            warn_as_err: true,
        },
    };
    let (mut p, diags) = capturing(config);
    p.parse_str(r#"<schema name="demo"><platform name="X" /><platform name="X" /></schema>"#, "w.xml")
        .unwrap();
    assert!(matches!(p.validate(), Err(DslError::WarningsAsErrors(_))));
    assert!(diags.borrow().iter().any(|d| d.severity == Severity::Warning));
}

#[test]
fn callback_receives_errors() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let mut p = Protocol::with_callback(
        ProtocolConfig::default(),
        Box::new(move |sev, msg| sink.borrow_mut().push((sev, msg.to_string()))),
    );
    p.parse_str(r#"<schema name="demo"><int name="A" type="float" /></schema>"#, "cb.xml")
        .unwrap();
    assert!(p.validate().is_err());
    assert!(seen.borrow().iter().any(|(sev, _)| *sev == Severity::Error));
}
