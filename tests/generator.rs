//! Generator tree tests: referencing and lazy preparation, default
//! interfaces, version queries against the minimal remote version, the
//! visitor walk and the text dump.

use commsdsl::gen::{GenField, GenFrame, GenInterface, GenMessage, GenSchema, Visitor};
use commsdsl::{
    dump, load_protocol, DslError, DslResult, GenConfig, GenState, Generator, Logger, Namespace, Protocol,
    ProtocolConfig, SchemaId, VersionWindow,
};
use std::io::Write;

const DEMO: &str = r#"
<schema name="demo" version="3" dslVersion="5" endian="big">
    <fields>
        <enum name="MsgId" type="uint8" semanticType="messageId">
            <validValue name="Pong" val="2" />
            <validValue name="Ping" val="1" />
        </enum>
        <int name="Unused" type="uint16" />
        <bundle name="Header">
            <int name="Flags" type="uint8" />
            <optional name="Text" defaultMode="missing">
                <string name="TextField"><lengthPrefix><int name="Len" type="uint8" /></lengthPrefix></string>
            </optional>
        </bundle>
    </fields>
    <ns name="msgs">
        <message name="Pong" id="MsgId.Pong">
            <ref name="Hdr" field="Header" />
            <int name="Old" type="uint8" deprecated="2" removed="true" />
            <string name="Note" length="4" sinceVersion="2" />
        </message>
        <message name="Ping" id="MsgId.Ping">
            <int name="Seq" type="uint16" />
        </message>
    </ns>
    <frame name="Frame">
        <size name="Size"><int name="SizeField" type="uint16" /></size>
        <id name="Id" field="MsgId" />
        <payload name="Data" />
    </frame>
</schema>
"#;

fn protocol(src: &str) -> Protocol {
    let config = ProtocolConfig::default();
    let (logger, diags) = Logger::capturing(config.logger);
    let mut p = Protocol::with_logger(config, logger);
    p.parse_str(src, "demo.xml").unwrap();
    if let Err(e) = p.validate() {
        panic!("{}: {:?}", e, diags.borrow());
    }
    p
}

fn lazy() -> GenConfig {
    GenConfig {
        all_interfaces_referenced: false,
        all_messages_referenced: false,
        ..Default::default()
    }
}

// ==================== preparation ====================

#[test]
fn referenced_elements_are_prepared() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    for m in gen.messages_of(SchemaId(0), false) {
        assert_eq!(m.state(), GenState::Prepared);
    }
    let header = gen.field(p.find_field("Header").unwrap());
    assert_eq!(header.state(), GenState::Prepared);
    assert!(header.members().iter().all(|m| m.is_prepared()));
    let unused = gen.field(p.find_field("Unused").unwrap());
    assert_eq!(unused.state(), GenState::Skipped);
    assert!(!unused.is_referenced());
}

#[test]
fn lazy_lookup_prepares_on_demand() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, lazy()).unwrap();
    let id = p.find_message("msgs.Ping").unwrap();
    assert_eq!(gen.message(id).state(), GenState::Skipped);
    assert!(!gen.has_any_referenced_message(SchemaId(0)));

    let ping = gen.find_message("msgs.Ping").unwrap();
    assert_eq!(ping.state(), GenState::Prepared);
    assert_eq!(ping.message().name, "Ping");
    assert!(gen.has_any_referenced_message(SchemaId(0)));

    let unused = gen.find_field("Unused").unwrap();
    assert_eq!(unused.state(), GenState::Prepared);
    assert!(gen.find_field("Missing").is_none());
    assert!(gen.find_frame("Frame").is_some());
}

#[test]
fn referenced_message_pulls_its_fields() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, lazy()).unwrap();
    let header = gen.field(p.find_field("Header").unwrap());
    assert_eq!(header.state(), GenState::Skipped);
    gen.find_message("msgs.Pong").unwrap();
    assert_eq!(header.state(), GenState::Prepared);
    assert!(header.is_referenced());
}

#[test]
fn message_id_fields_found() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let ids = gen.message_id_fields(SchemaId(0));
    assert_eq!(ids.len(), 1);
    assert_eq!(ids[0].name(), "MsgId");
}

#[test]
fn messages_sorted_by_id() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let names: Vec<&str> = gen
        .messages_of(SchemaId(0), true)
        .iter()
        .map(|m| m.message().name.as_str())
        .collect();
    assert_eq!(names, ["Ping", "Pong"]);
}

#[test]
fn unvalidated_protocol_rejected() {
    let mut p = Protocol::new(ProtocolConfig::default());
    p.parse_str(DEMO, "demo.xml").unwrap();
    assert!(Generator::prepare(&p, GenConfig::default()).is_err());
}

// ==================== interfaces ====================

#[test]
fn default_interface_added() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let schema = gen.protocol_schema().unwrap();
    let iface = schema.default_interface().unwrap();
    assert!(iface.is_default());
    assert_eq!(iface.name(), "Message");
    assert!(iface.fields().is_empty());
    assert_eq!(iface.state(), GenState::Prepared);
    assert!(gen.find_interface("").unwrap().is_default());
    assert_eq!(gen.interfaces_of(SchemaId(0)).len(), 1);
}

#[test]
fn declared_interface_replaces_default() {
    let src = DEMO.replace(
        "<ns name=\"msgs\">",
        "<interface name=\"Common\"><int name=\"Version\" type=\"uint8\" semanticType=\"version\" /></interface><ns name=\"msgs\">",
    );
    let p = protocol(&src);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let schema = gen.protocol_schema().unwrap();
    assert!(schema.default_interface().is_none());
    assert!(schema.version_dependent_code());
    let iface = gen.find_interface("Common").unwrap();
    assert_eq!(iface.fields().len(), 1);
    assert!(!iface.is_default());
}

#[test]
fn schema_without_messages_has_no_default_interface() {
    let p = protocol(r#"<schema name="bare"><int name="A" type="uint8" /></schema>"#);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    assert!(gen.protocol_schema().unwrap().default_interface().is_none());
    assert!(gen.find_interface("").is_none());
}

// ==================== versions ====================

#[test]
fn element_presence_against_remote_version() {
    let p = protocol(DEMO);
    let pong = p.registry().message(p.find_message("msgs.Pong").unwrap());
    let note = pong.find_field("Note").unwrap().versions();
    let old = pong.find_field("Old").unwrap().versions();

    let gen = Generator::prepare(
        &p,
        GenConfig {
            min_remote_version: 1,
            ..Default::default()
        },
    )
    .unwrap();
    let schema = gen.protocol_schema().unwrap();
    assert_eq!(schema.min_remote_version(), 1);
    assert!(schema.does_element_exist(note));
    assert!(schema.is_element_optional(note));
    assert!(schema.does_element_exist(old));
    assert!(schema.is_element_optional(old));
    assert!(schema.is_element_deprecated(old));
    assert!(!schema.is_element_deprecated(note));

    let gen = Generator::prepare(
        &p,
        GenConfig {
            min_remote_version: 2,
            ..Default::default()
        },
    )
    .unwrap();
    let schema = gen.protocol_schema().unwrap();
    assert!(schema.does_element_exist(note));
    assert!(!schema.is_element_optional(note));
    assert!(!schema.does_element_exist(old));
    assert!(schema.does_element_exist(VersionWindow::default()));
    assert!(!schema.does_element_exist(VersionWindow::new(4, u32::MAX, false)));
}

#[test]
fn remote_version_above_schema_version() {
    let p = protocol(DEMO);
    let res = Generator::prepare(
        &p,
        GenConfig {
            min_remote_version: 4,
            ..Default::default()
        },
    );
    assert!(matches!(res, Err(DslError::Semantic(_))));
}

// ==================== write / dump ====================

#[derive(Default)]
struct Counter {
    schemas: usize,
    namespaces: usize,
    fields: Vec<String>,
    interfaces: usize,
    messages: Vec<String>,
    frames: usize,
}

impl<'p> Visitor<'p> for Counter {
    fn schema(&mut self, _schema: &GenSchema<'p>) -> DslResult<()> {
        self.schemas += 1;
        Ok(())
    }

    fn enter_namespace(&mut self, _ns: &'p Namespace) -> DslResult<()> {
        self.namespaces += 1;
        Ok(())
    }

    fn field(&mut self, field: &GenField<'p>) -> DslResult<()> {
        self.fields.push(field.name().to_string());
        Ok(())
    }

    fn interface(&mut self, _iface: &GenInterface<'p>) -> DslResult<()> {
        self.interfaces += 1;
        Ok(())
    }

    fn message(&mut self, msg: &GenMessage<'p>) -> DslResult<()> {
        self.messages.push(msg.message().name.clone());
        Ok(())
    }

    fn frame(&mut self, _frame: &GenFrame<'p>) -> DslResult<()> {
        self.frames += 1;
        Ok(())
    }
}

#[test]
fn write_visits_prepared_elements() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let mut c = Counter::default();
    gen.write(&mut c).unwrap();
    assert_eq!(c.schemas, 1);
    assert_eq!(c.namespaces, 2);
    assert_eq!(c.fields, ["MsgId", "Header"]);
    assert_eq!(c.interfaces, 1);
    assert_eq!(c.messages, ["Pong", "Ping"]);
    assert_eq!(c.frames, 1);

    let pong = gen.find_message("msgs.Pong").unwrap();
    assert_eq!(pong.state(), GenState::Written);
    let unused = gen.field(p.find_field("Unused").unwrap());
    assert_eq!(unused.state(), GenState::Skipped);
}

#[test]
fn dump_lists_tree() {
    let p = protocol(DEMO);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let text = dump::dump(&gen).unwrap();
    assert!(text.starts_with("schema demo version=3 minRemoteVersion=0"));
    assert!(text.contains("ns msgs"));
    let ping = text.find("message Ping id=1 [2]").unwrap();
    let pong = text.find("message Pong id=2").unwrap();
    assert!(ping < pong);
    assert!(text.contains("frame Frame backPayloadOffset=0"));
    assert!(text.contains("interface Message (default)"));
    assert!(!text.contains("Unused"));
}

// ==================== multiple schemas / files ====================

#[test]
fn load_files_and_resolve_across_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.xml");
    let b = dir.path().join("b.xml");
    std::fs::File::create(&a)
        .unwrap()
        .write_all(br#"<schema name="A" dslVersion="5"><ns name="Foo"><int name="Bar" type="uint32" /></ns></schema>"#)
        .unwrap();
    std::fs::File::create(&b)
        .unwrap()
        .write_all(
            br#"<schema name="B" version="2" dslVersion="5">
                  <enum name="MsgId" type="uint8" semanticType="messageId"><validValue name="M" val="1" /></enum>
                  <message name="M" id="MsgId.M"><ref name="R" field="@A.Foo.Bar" /></message>
                </schema>"#,
        )
        .unwrap();

    let config = GenConfig {
        multiple_schemas_enabled: true,
        min_remote_version: 1,
        ..Default::default()
    };
    let p = load_protocol(&[&a, &b], &config).unwrap();
    let gen = Generator::prepare(&p, config).unwrap();
    assert_eq!(gen.schemas().len(), 2);
    assert_eq!(gen.protocol_schema().unwrap().name(), "B");
    assert_eq!(gen.schema(SchemaId(0)).min_remote_version(), 0);
    assert_eq!(gen.protocol_schema().unwrap().min_remote_version(), 1);

    // The external field is pulled in by the message referencing it.
    let bar = gen.field(p.find_field("@A.Foo.Bar").unwrap());
    assert_eq!(bar.state(), GenState::Prepared);
    assert_eq!(bar.ext_ref(), "Foo.Bar");
    assert!(gen.schema(SchemaId(0)).default_interface().is_none());
    assert!(gen.protocol_schema().unwrap().default_interface().is_some());
}

#[test]
fn load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let res = load_protocol(&[dir.path().join("none.xml")], &GenConfig::default());
    assert!(matches!(res, Err(DslError::Io(_))));
}
