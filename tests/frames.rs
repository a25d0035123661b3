//! Frame and layer tests: layer verification, processing order, back payload
//! offset, pseudo version layers and the flags layers force on their fields.

use commsdsl::layer::ChecksumAlg;
use commsdsl::{Diagnostic, GenConfig, Generator, LayerKind, Logger, Protocol, ProtocolConfig};
use std::cell::RefCell;
use std::rc::Rc;

type Diags = Rc<RefCell<Vec<Diagnostic>>>;

const MSG_ID: &str = r#"
    <enum name="MsgId" type="uint8" semanticType="messageId">
        <validValue name="Ping" val="1" />
    </enum>
    <message name="Ping" id="MsgId.Ping">
        <int name="Seq" type="uint16" />
    </message>
"#;

const FULL_FRAME: &str = r#"
    <frame name="Frame">
        <sync name="Sync"><int name="SyncField" type="uint16" defaultValue="0xabcd" /></sync>
        <size name="Size"><int name="SizeField" type="uint16" /></size>
        <id name="Id" field="MsgId" />
        <payload name="Data" />
        <checksum name="Checksum" alg="crc-ccitt" from="Size">
            <int name="ChecksumField" type="uint16" />
        </checksum>
        <custom name="Trailer"><int name="TrailerField" type="uint8" /></custom>
    </frame>
"#;

const VERSION_FRAME: &str = r#"
    <interface name="Message">
        <int name="Version" type="uint8" semanticType="version" />
    </interface>
    <frame name="VersionFrame">
        <id name="Id" field="MsgId" />
        <value name="Version" interfaceFieldName="Version" pseudo="true">
            <int name="VersionField" type="uint8" semanticType="version" />
        </value>
        <payload name="Data" />
    </frame>
"#;

fn load(body: &str) -> (Protocol, Diags, Result<(), commsdsl::DslError>) {
    let config = ProtocolConfig::default();
    let (logger, diags) = Logger::capturing(config.logger);
    let mut p = Protocol::with_logger(config, logger);
    let src = format!(
        r#"<schema name="test" version="3" dslVersion="5" endian="big">{}{}</schema>"#,
        MSG_ID, body
    );
    p.parse_str(&src, "frames.xml").expect("xml");
    let res = p.validate();
    (p, diags, res)
}

fn load_ok(body: &str) -> Protocol {
    let (p, diags, res) = load(body);
    if let Err(e) = res {
        panic!("{}: {:?}", e, diags.borrow());
    }
    p
}

fn load_err(body: &str, text: &str) {
    let (_, diags, res) = load(body);
    assert!(res.is_err());
    assert!(
        diags.borrow().iter().any(|d| d.message.contains(text)),
        "no diagnostic containing {:?} in {:?}",
        text,
        diags.borrow()
    );
}

// ==================== parsing ====================

#[test]
fn layers_in_declared_order() {
    let p = load_ok(FULL_FRAME);
    let frame = p.registry().frame(p.find_frame("Frame").unwrap());
    let kinds: Vec<LayerKind> = frame.layers.iter().map(|l| l.kind()).collect();
    assert_eq!(
        kinds,
        [
            LayerKind::Sync,
            LayerKind::Size,
            LayerKind::Id,
            LayerKind::Payload,
            LayerKind::Checksum,
            LayerKind::Custom
        ]
    );
    assert!(frame.has_id_layer());
    assert_eq!(frame.payload_idx(), Some(3));
    let checksum = frame.layer("Checksum").unwrap().as_checksum().unwrap();
    assert_eq!(checksum.alg, ChecksumAlg::Crc16Ccitt);
    assert_eq!(checksum.range.from, "Size");
}

#[test]
fn layers_group_element() {
    let p = load_ok(
        r#"<frame name="Grouped">
             <layers>
               <id name="Id" field="MsgId" />
               <payload name="Data" />
             </layers>
           </frame>"#,
    );
    let frame = p.registry().frame(p.find_frame("Grouped").unwrap());
    assert_eq!(frame.layers.len(), 2);
}

#[test]
fn payload_is_required() {
    load_err(
        r#"<frame name="NoPayload"><id name="Id" field="MsgId" /></frame>"#,
        "must contain a \"payload\" layer",
    );
}

#[test]
fn empty_frame() {
    load_err(r#"<frame name="Empty" />"#, "must contain at least one layer");
}

#[test]
fn duplicate_layer_name() {
    load_err(
        r#"<frame name="Dup">
             <id name="L" field="MsgId" />
             <payload name="L" />
           </frame>"#,
        "has already been defined within the same frame",
    );
}

#[test]
fn single_id_layer() {
    load_err(
        r#"<frame name="TwoIds">
             <id name="Id1" field="MsgId" />
             <id name="Id2" field="MsgId" />
             <payload name="Data" />
           </frame>"#,
        "Only single \"id\" layer",
    );
}

#[test]
fn id_after_payload() {
    load_err(
        r#"<frame name="Late">
             <payload name="Data" />
             <id name="Id" field="MsgId" />
           </frame>"#,
        "expected to be before the \"payload\"",
    );
}

#[test]
fn payload_with_field() {
    load_err(
        r#"<frame name="Bad">
             <payload name="Data"><int name="F" type="uint8" /></payload>
           </frame>"#,
        "mustn't specify field",
    );
}

#[test]
fn size_without_field() {
    load_err(
        r#"<frame name="Bad">
             <size name="Size" />
             <payload name="Data" />
           </frame>"#,
        "must specify field",
    );
}

#[test]
fn checksum_from_must_precede() {
    load_err(
        r#"<frame name="Bad">
             <checksum name="Checksum" alg="sum" from="Size"><int name="C" type="uint8" /></checksum>
             <size name="Size"><int name="S" type="uint8" /></size>
             <payload name="Data" />
           </frame>"#,
        "must appear before",
    );
}

#[test]
fn checksum_needs_range() {
    load_err(
        r#"<frame name="Bad">
             <payload name="Data" />
             <checksum name="Checksum" alg="sum"><int name="C" type="uint8" /></checksum>
           </frame>"#,
        "must set \"from\" or \"until\"",
    );
}

#[test]
fn custom_checksum_needs_alg_name() {
    let (_, _, res) = load(
        r#"<frame name="Bad">
             <payload name="Data" />
             <checksum name="Checksum" alg="custom" until="Data"><int name="C" type="uint8" /></checksum>
           </frame>"#,
    );
    assert!(res.is_err());
}

// ==================== processing order ====================

#[test]
fn checksum_moves_before_its_source() {
    let p = load_ok(FULL_FRAME);
    let frame = p.registry().frame(p.find_frame("Frame").unwrap());
    let names: Vec<&str> = frame
        .ordered_layers(p.logger())
        .unwrap()
        .iter()
        .map(|l| l.name.as_str())
        .collect();
    assert_eq!(names, ["Sync", "Checksum", "Size", "Id", "Data", "Trailer"]);
}

#[test]
fn checksum_until_payload_keeps_order() {
    let p = load_ok(
        r#"<frame name="Prefix">
             <checksum name="Checksum" alg="xor" until="Data"><int name="C" type="uint8" /></checksum>
             <id name="Id" field="MsgId" />
             <payload name="Data" />
           </frame>"#,
    );
    let frame = p.registry().frame(p.find_frame("Prefix").unwrap());
    assert_eq!(frame.processing_order(p.logger()).unwrap(), vec![0, 1, 2]);
}

#[test]
fn checksum_until_other_layer_fails_preparation() {
    let (p, diags, res) = load(
        r#"<frame name="Prefix">
             <checksum name="Checksum" alg="xor" until="Id"><int name="C" type="uint8" /></checksum>
             <id name="Id" field="MsgId" />
             <payload name="Data" />
           </frame>"#,
    );
    res.unwrap();
    assert!(Generator::prepare(&p, GenConfig::default()).is_err());
    assert!(diags.borrow().iter().any(|d| d.message.contains("until payload layer")));
}

// ==================== lengths ====================

#[test]
fn back_payload_offset_sums_trailing_layers() {
    let p = load_ok(FULL_FRAME);
    let reg = p.registry();
    let frame = reg.frame(p.find_frame("Frame").unwrap());
    assert_eq!(frame.back_payload_offset(reg), 3);
}

#[test]
fn back_payload_offset_without_trailer() {
    let p = load_ok(VERSION_FRAME);
    let reg = p.registry();
    let frame = reg.frame(p.find_frame("VersionFrame").unwrap());
    assert_eq!(frame.back_payload_offset(reg), 0);
}

// ==================== version layers ====================

#[test]
fn pseudo_version_layer_detected() {
    let p = load_ok(VERSION_FRAME);
    let reg = p.registry();
    let frame = reg.frame(p.find_frame("VersionFrame").unwrap());
    assert!(frame.has_pseudo_version_layer(reg));
    let names: Vec<&str> = frame.pseudo_version_layers(reg).map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Version"]);
    let value = frame.layer("Version").unwrap().as_value().unwrap();
    assert_eq!(value.field_idx, 0);
    assert!(value.pseudo);
}

#[test]
fn value_layer_needs_interface_field() {
    load_err(
        r#"<interface name="Message">
             <int name="Flags" type="uint8" />
           </interface>
           <frame name="Bad">
             <value name="Version" interfaceFieldName="Version">
               <int name="VersionField" type="uint8" />
             </value>
             <payload name="Data" />
           </frame>"#,
        "doesn't contain field named \"Version\"",
    );
}

// ==================== generator view ====================

#[test]
fn layers_force_field_flags() {
    let body = format!("{}{}", FULL_FRAME, VERSION_FRAME);
    let p = load_ok(&body);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();

    let frame = gen.find_frame("Frame").unwrap();
    let sync = frame.layers()[0].field().unwrap();
    assert!(sync.is_forced_fail_on_invalid());
    assert!(sync.fails_on_invalid());
    assert!(!sync.is_pseudo());
    let order: Vec<&str> = frame
        .ordered_layers()
        .unwrap()
        .iter()
        .map(|l| l.layer().name.as_str())
        .collect();
    assert_eq!(order[..2], ["Sync", "Checksum"]);

    let frame = gen.find_frame("VersionFrame").unwrap();
    let version = frame.layers()[1].field().unwrap();
    assert!(version.is_forced_pseudo());
    assert!(version.is_pseudo());
    assert!(!version.fails_on_invalid());
}

#[test]
fn external_layer_field_is_prepared() {
    let p = load_ok(FULL_FRAME);
    let gen = Generator::prepare(&p, GenConfig::default()).unwrap();
    let id_field = gen.find_field("MsgId").unwrap();
    assert!(id_field.is_prepared());
    let frame = gen.find_frame("Frame").unwrap();
    assert_eq!(frame.layers()[2].field().unwrap().ext_ref(), "MsgId");
}
