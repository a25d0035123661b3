//! Field tests: every kind parsed from schema text, length bounds, value
//! checks, reuse and version windows.

use commsdsl::common::MAX_POSSIBLE_LENGTH;
use commsdsl::field::cond::{Cond, CondListType};
use commsdsl::{Diagnostic, Field, Kind, Logger, Protocol, ProtocolConfig, Registry, Severity};
use std::cell::RefCell;
use std::rc::Rc;

type Diags = Rc<RefCell<Vec<Diagnostic>>>;

fn load(body: &str) -> (Protocol, Diags, Result<(), commsdsl::DslError>) {
    let config = ProtocolConfig::default();
    let (logger, diags) = Logger::capturing(config.logger);
    let mut p = Protocol::with_logger(config, logger);
    let src = format!(
        r#"<schema name="test" version="5" dslVersion="5" endian="big">{}</schema>"#,
        body
    );
    p.parse_str(&src, "test.xml").expect("xml");
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
    assert!(res.is_err(), "expected failure for {}", body);
    assert!(
        diags.borrow().iter().any(|d| d.message.contains(text)),
        "no diagnostic containing {:?} in {:?}",
        text,
        diags.borrow()
    );
}

fn load_warn(body: &str, text: &str) -> Protocol {
    let (p, diags, res) = load(body);
    if let Err(e) = res {
        panic!("{}: {:?}", e, diags.borrow());
    }
    assert!(
        diags
            .borrow()
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains(text)),
        "no warning containing {:?} in {:?}",
        text,
        diags.borrow()
    );
    p
}

fn field<'a>(p: &'a Protocol, name: &str) -> (&'a Field, &'a Registry) {
    let reg = p.registry();
    let id = p.find_field(name).unwrap_or_else(|| panic!("field {} not found", name));
    (reg.field(id), reg)
}

fn lengths(p: &Protocol, name: &str) -> (usize, usize) {
    let (f, reg) = field(p, name);
    (f.min_length(reg), f.max_length(reg))
}

// ==================== int ====================

#[test]
fn int_type_lengths() {
    let p = load_ok(
        r#"<int name="A" type="uint8" />
           <int name="B" type="int16" />
           <int name="C" type="uint32" length="3" />
           <int name="D" type="uint64" />"#,
    );
    assert_eq!(lengths(&p, "A"), (1, 1));
    assert_eq!(lengths(&p, "B"), (2, 2));
    assert_eq!(lengths(&p, "C"), (3, 3));
    assert_eq!(lengths(&p, "D"), (8, 8));
    assert_eq!(field(&p, "A").0.kind(), Kind::Int);
}

#[test]
fn int_default_from_special() {
    let p = load_ok(
        r#"<int name="A" type="uint8" defaultValue="Invalid">
             <special name="Invalid" val="0xff" />
           </int>"#,
    );
    let int = field(&p, "A").0.as_int().unwrap();
    assert_eq!(int.default_value, 255);
    assert!(int.specials.contains_key("Invalid"));
}

#[test]
fn int_valid_range_beyond_type() {
    load_err(
        r#"<int name="A" type="uint8" validRange="[0, 300]" />"#,
        "above the type's maximal value",
    );
}

#[test]
fn int_valid_ranges_merge() {
    let p = load_ok(r#"<int name="A" type="uint8" validRange="[0, 5]" validValue="6" validMax="10" />"#);
    let int = field(&p, "A").0.as_int().unwrap();
    assert_eq!(int.valid_ranges.len(), 1);
    assert_eq!((int.valid_ranges[0].min, int.valid_ranges[0].max), (0, 10));
}

#[test]
fn int_special_outside_serializable_range() {
    let p = load_warn(
        r#"<bitfield name="BF">
             <int name="Low" type="uint8" bitLength="4">
               <special name="Big" val="20" />
             </int>
             <int name="High" type="uint8" bitLength="4" />
           </bitfield>"#,
        "Special value \"Big\" is outside the range of correctly serializable values",
    );
    let (bf, _) = field(&p, "BF");
    assert_eq!(bf.members()[0].as_int().unwrap().specials["Big"].value, 20);
}

#[test]
fn int_default_outside_serializable_range() {
    load_warn(
        r#"<bitfield name="BF">
             <int name="Low" type="uint8" bitLength="4" defaultValue="16" />
             <int name="High" type="uint8" bitLength="4" />
           </bitfield>"#,
        "will not be serialised correctly (16)",
    );
}

#[test]
fn int_valid_range_outside_serializable_range() {
    load_warn(
        r#"<bitfield name="BF">
             <int name="Low" type="uint8" bitLength="4" validRange="[0, 200]" />
             <int name="High" type="uint8" bitLength="4" />
           </bitfield>"#,
        "Range's max value (200) is outside the range of correctly serializable values",
    );
    load_warn(
        r#"<int name="A" type="uint8" serOffset="10" validValue="250" />"#,
        "Property value \"validValue\" (250) is outside the range of correctly serializable values",
    );

    let (_, diags, res) = load(r#"<int name="A" type="uint8" validRange="[0, 200]" />"#);
    assert!(res.is_ok());
    assert!(diags.borrow().iter().all(|d| d.severity != Severity::Warning));
}

#[test]
fn int_unknown_type() {
    let (_, _, res) = load(r#"<int name="A" type="uint9" />"#);
    assert!(res.is_err());
}

#[test]
fn invalid_field_name() {
    load_err(r#"<int name="1A" type="uint8" />"#, "Invalid value for name property");
}

// ==================== enum / set ====================

#[test]
fn enum_values() {
    let p = load_ok(
        r#"<enum name="E" type="uint8" defaultValue="B">
             <validValue name="A" val="1" />
             <validValue name="B" val="2" />
           </enum>"#,
    );
    let e = field(&p, "E").0.as_enum().unwrap();
    assert_eq!(e.values.len(), 2);
    assert_eq!(e.default_value, 2);
}

#[test]
fn enum_duplicate_name() {
    load_err(
        r#"<enum name="E" type="uint8">
             <validValue name="A" val="1" />
             <validValue name="A" val="2" />
           </enum>"#,
        "has already been defined",
    );
}

#[test]
fn enum_duplicate_value() {
    let dup = r#"<validValue name="A" val="1" /><validValue name="B" val="1" />"#;
    load_err(
        &format!(r#"<enum name="E" type="uint8">{}</enum>"#, dup),
        "has been already defined as",
    );
    load_ok(&format!(
        r#"<enum name="E" type="uint8" nonUniqueAllowed="true">{}</enum>"#,
        dup
    ));
}

#[test]
fn enum_reuse_cannot_clear_non_unique() {
    let base = r#"<enum name="A" type="uint8" nonUniqueAllowed="true">
                    <validValue name="X" val="1" />
                    <validValue name="Y" val="1" />
                  </enum>"#;
    load_err(
        &format!(r#"{}<enum name="B" reuse="A" nonUniqueAllowed="false" />"#, base),
        "Cannot clear \"nonUniqueAllowed\" property value while having multiple names",
    );

    let p = load_ok(&format!(r#"{}<enum name="B" reuse="A" />"#, base));
    let e = field(&p, "B").0.as_enum().unwrap();
    assert!(e.non_unique_allowed);
    assert!(!e.is_unique());

    let p = load_ok(
        r#"<enum name="A" type="uint8" nonUniqueAllowed="true">
             <validValue name="X" val="1" />
             <validValue name="Y" val="2" />
           </enum>
           <enum name="B" reuse="A" nonUniqueAllowed="false" />"#,
    );
    assert!(!field(&p, "B").0.as_enum().unwrap().non_unique_allowed);
}

#[test]
fn enum_without_values() {
    load_err(r#"<enum name="E" type="uint8" />"#, "doesn't list any valid value");
}

#[test]
fn set_bits() {
    let p = load_ok(
        r#"<set name="S" length="2">
             <bit name="First" idx="0" />
             <bit name="Last" idx="15" />
           </set>"#,
    );
    assert_eq!(lengths(&p, "S"), (2, 2));
    assert_eq!(field(&p, "S").0.kind(), Kind::Set);
}

#[test]
fn set_duplicate_bit_index() {
    let dup = r#"<bit name="A" idx="0" /><bit name="B" idx="0" />"#;
    load_err(
        &format!(r#"<set name="S" length="1">{}</set>"#, dup),
        "Bit \"0\" has been already defined as \"A\"",
    );
    let p = load_ok(&format!(
        r#"<set name="S" length="1" nonUniqueAllowed="true">{}</set>"#,
        dup
    ));
    assert!(!field(&p, "S").0.as_set().unwrap().is_unique());
}

#[test]
fn set_reuse_cannot_clear_non_unique() {
    load_err(
        r#"<set name="A" length="1" nonUniqueAllowed="true">
             <bit name="X" idx="0" />
             <bit name="Y" idx="0" />
           </set>
           <set name="B" reuse="A" nonUniqueAllowed="false" />"#,
        "Cannot clear \"nonUniqueAllowed\" property value",
    );
}

#[test]
fn set_reserved_bit_keeps_owner_versions() {
    load_err(
        r#"<set name="S" length="1">
             <bit name="R" idx="0" reserved="true" sinceVersion="2" />
           </set>"#,
        "Cannot modify version information on explicity reserved bits",
    );
    load_err(
        r#"<set name="S" length="1">
             <bit name="R" idx="0" reserved="true" deprecated="3" />
           </set>"#,
        "Cannot modify version information on explicity reserved bits",
    );

    let p = load_ok(
        r#"<set name="S" length="1">
             <bit name="R" idx="0" reserved="true" />
             <bit name="New" idx="1" sinceVersion="2" />
           </set>"#,
    );
    let set = field(&p, "S").0.as_set().unwrap();
    assert!(set.bits["R"].reserved);
    assert_eq!(set.bits["New"].versions.since, 2);
}

#[test]
fn set_bit_consistent_across_overlapping_versions() {
    load_err(
        r#"<set name="S" length="1" nonUniqueAllowed="true">
             <bit name="A" idx="0" defaultValue="true" />
             <bit name="B" idx="0" />
           </set>"#,
        "Inconsistent value of \"defaultValue\" property for bit 0",
    );
    load_ok(
        r#"<set name="S" length="1" nonUniqueAllowed="true">
             <bit name="A" idx="0" defaultValue="true" deprecated="2" />
             <bit name="B" idx="0" sinceVersion="2" />
           </set>"#,
    );
}

// ==================== sequences ====================

#[test]
fn string_lengths() {
    let p = load_ok(
        r#"<string name="Fixed" length="4" />
           <string name="Prefixed">
             <lengthPrefix><int name="Len" type="uint8" /></lengthPrefix>
           </string>
           <string name="Open" />"#,
    );
    assert_eq!(lengths(&p, "Fixed"), (4, 4));
    assert_eq!(lengths(&p, "Prefixed"), (1, 256));
    assert_eq!(lengths(&p, "Open"), (0, MAX_POSSIBLE_LENGTH));
}

#[test]
fn data_with_external_prefix() {
    let p = load_ok(
        r#"<int name="Len" type="uint16" />
           <data name="D" lengthPrefix="Len" />"#,
    );
    assert_eq!(lengths(&p, "D"), (2, 2 + 0xffff));
}

#[test]
fn list_lengths() {
    let p = load_ok(
        r#"<list name="Fixed" count="3"><int name="E" type="uint16" /></list>
           <list name="Counted">
             <element><int name="E" type="uint16" /></element>
             <countPrefix><int name="Cnt" type="uint8" /></countPrefix>
           </list>"#,
    );
    assert_eq!(lengths(&p, "Fixed"), (6, 6));
    assert_eq!(lengths(&p, "Counted"), (1, 1 + 255 * 2));
}

// ==================== composites ====================

#[test]
fn bundle_sums_members() {
    let p = load_ok(
        r#"<bundle name="B">
             <int name="A" type="uint8" />
             <int name="C" type="uint32" />
             <optional name="O" defaultMode="missing"><int name="X" type="uint16" /></optional>
           </bundle>"#,
    );
    assert_eq!(lengths(&p, "B"), (5, 7));
    let (b, _) = field(&p, "B");
    let names: Vec<&str> = b.members().iter().map(|m| m.name()).collect();
    assert_eq!(names, ["A", "C", "O"]);
}

#[test]
fn bundle_duplicate_member() {
    let (_, _, res) = load(
        r#"<bundle name="B">
             <int name="A" type="uint8" />
             <int name="A" type="uint8" />
           </bundle>"#,
    );
    assert!(res.is_err());
}

#[test]
fn bitfield_bits() {
    let p = load_ok(
        r#"<bitfield name="BF">
             <int name="Low" type="uint8" bitLength="3" />
             <int name="High" type="uint8" bitLength="5" />
           </bitfield>"#,
    );
    let (bf, reg) = field(&p, "BF");
    assert_eq!(bf.min_length(reg), 1);
    assert_eq!(bf.members()[0].bit_length(reg), 3);
}

#[test]
fn bitfield_partial_byte() {
    load_err(
        r#"<bitfield name="BF">
             <int name="Low" type="uint8" bitLength="3" />
           </bitfield>"#,
        "devisable by 8",
    );
}

#[test]
fn variant_longest_member() {
    let p = load_ok(
        r#"<variant name="V">
             <int name="Small" type="uint8" />
             <int name="Large" type="uint32" />
           </variant>"#,
    );
    assert_eq!(lengths(&p, "V"), (0, 4));
}

#[test]
fn ref_follows_target() {
    let p = load_ok(
        r#"<int name="A" type="uint16" />
           <ref name="R" field="A" />"#,
    );
    let (r, reg) = field(&p, "R");
    assert_eq!(r.kind(), Kind::Ref);
    assert_eq!(r.non_ref(reg).name(), "A");
    assert_eq!(lengths(&p, "R"), (2, 2));
}

#[test]
fn ref_to_unknown_field() {
    let (_, _, res) = load(r#"<ref name="R" field="Nowhere" />"#);
    assert!(res.is_err());
}

// ==================== conditions ====================

fn in_message(fields: &str) -> String {
    format!(
        r#"<enum name="MsgId" type="uint8" semanticType="messageId">
             <validValue name="M" val="1" />
           </enum>
           <message name="Msg" id="MsgId.M">{}</message>"#,
        fields
    )
}

fn message_cond<'a>(p: &'a Protocol, name: &str) -> &'a Cond {
    let msg = p.registry().message(p.find_message("Msg").unwrap());
    let opt = msg.find_field(name).unwrap().as_optional().unwrap();
    opt.cond.as_ref().unwrap()
}

#[test]
fn optional_single_conditions() {
    let p = load_ok(&in_message(
        r#"<set name="Flags" length="1"><bit name="HasVal" idx="0" /></set>
           <int name="Count" type="uint8" />
           <optional name="Val" cond="$Flags.HasVal"><int name="V" type="uint16" /></optional>
           <optional name="NoVal" cond="!$Flags.HasVal"><int name="N" type="uint8" /></optional>
           <optional name="Other" cond="$Count != 0"><int name="W" type="uint8" /></optional>"#,
    ));
    let Cond::Expr(check) = message_cond(&p, "Val") else {
        panic!("expected single condition");
    };
    assert_eq!((check.left.as_str(), check.op.as_str()), ("", ""));
    assert_eq!(check.right, "$Flags.HasVal");

    let Cond::Expr(negated) = message_cond(&p, "NoVal") else {
        panic!("expected single condition");
    };
    assert_eq!((negated.op.as_str(), negated.right.as_str()), ("!", "$Flags.HasVal"));

    let Cond::Expr(cmp) = message_cond(&p, "Other") else {
        panic!("expected single condition");
    };
    assert_eq!(
        (cmp.left.as_str(), cmp.op.as_str(), cmp.right.as_str()),
        ("$Count", "!=", "0")
    );
}

#[test]
fn optional_bundled_conditions() {
    let p = load_ok(&in_message(
        r#"<int name="A" type="uint8" />
           <int name="B" type="uint8" />
           <optional name="O">
             <field><int name="V" type="uint8" /></field>
             <or>
               <cond value="$A = 1" />
               <and>
                 <cond value="$B = 2" />
                 <cond value="$A != 0" />
               </and>
             </or>
           </optional>"#,
    ));
    let Cond::List(CondListType::Or, conds) = message_cond(&p, "O") else {
        panic!("expected or bundle");
    };
    assert_eq!(conds.len(), 2);
    assert!(matches!(&conds[0], Cond::Expr(e) if e.left == "$A" && e.right == "1"));
    assert!(matches!(&conds[1], Cond::List(CondListType::And, inner) if inner.len() == 2));
}

#[test]
fn optional_condition_in_bundle_member() {
    let p = load_ok(
        r#"<bundle name="Bn">
             <int name="A" type="uint8" />
             <optional name="O" cond="$A = 1"><int name="V" type="uint8" /></optional>
           </bundle>"#,
    );
    let (bn, reg) = field(&p, "Bn");
    assert_eq!((bn.min_length(reg), bn.max_length(reg)), (1, 2));
}

#[test]
fn optional_condition_rejections() {
    load_err(
        &in_message(
            r#"<optional name="O" cond="$Missing = 1"><int name="V" type="uint8" /></optional>"#,
        ),
        "is expected to dereference existing sibling field",
    );
    load_err(
        &in_message(
            r#"<optional name="O" cond="$B = 1"><int name="V" type="uint8" /></optional>
               <int name="B" type="uint8" />"#,
        ),
        "is expected to dereference existing sibling field",
    );
    load_err(
        &in_message(
            r#"<int name="A" type="uint8" />
               <optional name="O" cond="1 = $A"><int name="V" type="uint8" /></optional>"#,
        ),
        "left side of comparison operator must dereference other field",
    );
    load_err(
        &in_message(
            r#"<int name="A" type="uint8" />
               <optional name="O" cond="$A = Unknown"><int name="V" type="uint8" /></optional>"#,
        ),
        "cannot be compared to value",
    );
    load_err(
        &in_message(
            r#"<int name="A" type="uint8" />
               <optional name="O">
                 <field><int name="V" type="uint8" /></field>
                 <and><cond value="$A = 1" /></and>
               </optional>"#,
        ),
        "is expected to have at least 2 conditions",
    );
    load_err(
        &in_message(
            r#"<int name="A" type="uint8" />
               <optional name="O" cond="$A = 1">
                 <field><int name="V" type="uint8" /></field>
                 <and><cond value="$A = 1" /><cond value="$A = 2" /></and>
               </optional>"#,
        ),
        "condition bundling together with \"cond\" property",
    );
    load_err(
        r#"<optional name="O" cond="$A = 1"><int name="V" type="uint8" /></optional>"#,
        "applicable only to members of \"bundle\" and \"message\"",
    );
}

// ==================== reuse ====================

#[test]
fn reuse_keeps_type_and_overrides_description() {
    let p = load_ok(
        r#"<int name="A" type="uint16" validRange="[0, 10]" description="orig" />
           <int name="B" reuse="A" description="copy" />"#,
    );
    let (b, reg) = field(&p, "B");
    assert_eq!(b.description(), "copy");
    assert_eq!(b.min_length(reg), 2);
    let int = b.as_int().unwrap();
    assert_eq!(int.valid_ranges.len(), 1);
    assert_eq!(int.valid_ranges[0].max, 10);
    assert_eq!(field(&p, "A").0.description(), "orig");
}

#[test]
fn reuse_of_other_kind() {
    load_err(
        r#"<int name="A" type="uint16" />
           <enum name="B" reuse="A"><validValue name="V" val="0" /></enum>"#,
        "Cannot reuse field of different kind",
    );
}

#[test]
fn reuse_before_definition() {
    load_err(
        r#"<int name="B" reuse="A" />
           <int name="A" type="uint16" />"#,
        "hasn't been recorded yet",
    );
}

// ==================== versions ====================

#[test]
fn message_field_versions() {
    let p = load_ok(
        r#"<enum name="MsgId" type="uint8" semanticType="messageId">
             <validValue name="M" val="1" />
           </enum>
           <message name="Msg" id="MsgId.M">
             <int name="A" type="uint8" />
             <int name="B" type="uint8" sinceVersion="2" deprecated="4" removed="true" />
           </message>"#,
    );
    let reg = p.registry();
    let msg = reg.message(p.find_message("Msg").unwrap());
    let b = msg.find_field("B").unwrap().versions();
    assert_eq!((b.since, b.deprecated, b.removed), (2, 4, true));
    assert!(b.exists_at(3));
    assert!(!b.exists_at(4));
    assert_eq!(msg.min_length(reg), 1);
    assert_eq!(msg.max_length(reg), 2);
}

#[test]
fn since_version_beyond_schema() {
    load_err(
        r#"<enum name="MsgId" type="uint8" semanticType="messageId">
             <validValue name="M" val="1" />
           </enum>
           <message name="Msg" id="MsgId.M">
             <int name="B" type="uint8" sinceVersion="6" />
           </message>"#,
        "cannot be greater than value of \"version\"",
    );
}

#[test]
fn global_field_ignores_since_version() {
    let (p, diags, res) = load(r#"<int name="A" type="uint8" sinceVersion="2" />"#);
    assert!(res.is_ok());
    assert_eq!(field(&p, "A").0.versions().since, 0);
    assert!(diags.borrow().iter().any(|d| d.message.contains("not applicable to this field")));
}
