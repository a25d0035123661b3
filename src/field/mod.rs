//! Field model.
//!
//! A [`Field`] is the part every kind shares ([`FieldCommon`]) plus a kind
//! payload ([`FieldKind`]). Each payload implements [`FieldImpl`], the set of
//! hooks the common parser drives while creating a field:
//!
//! 1. reuse (`reuse="ref"` copies an already recorded field of the same kind),
//! 2. member replacement (`<replace>`),
//! 3. common properties (name, versions, semantic type, flags, overrides),
//! 4. kind-specific properties,
//! 5. semantic type, name and minimal length verification,
//! 6. rejection of unknown properties (dotted names are kept as extra data).

pub mod bitfield;
pub mod bundle;
pub mod cond;
pub mod data;
pub mod enums;
pub mod int;
pub mod list;
pub mod optional;
pub mod prefix;
pub mod reference;
pub mod set;
pub mod string;
pub mod variant;

pub use bitfield::BitfieldField;
pub use bundle::BundleField;
pub use data::DataField;
pub use enums::EnumField;
pub use int::IntField;
pub use list::ListField;
pub use optional::OptionalField;
pub use prefix::Prefix;
pub use reference::RefField;
pub use set::SetField;
pub use string::StringField;
pub use variant::VariantField;

use crate::common;
use crate::diag::Logger;
use crate::error::{DslError, DslResult};
use crate::props::{self, Extra, Props};
use crate::registry::{FieldId, ParseCtx, Parent, Registry, SchemaId};
use crate::schema::Feature;
use crate::version::{VersionWindow, NOT_YET_DEPRECATED};
use crate::xml::{SrcPos, XmlNode};

pub const REUSE: &str = "reuse";
pub const SEMANTIC_TYPE: &str = "semanticType";
pub const PSEUDO: &str = "pseudo";
pub const FIXED_VALUE: &str = "fixedValue";
pub const DISPLAY_READ_ONLY: &str = "displayReadOnly";
pub const DISPLAY_HIDDEN: &str = "displayHidden";
pub const CUSTOMIZABLE: &str = "customizable";
pub const FAIL_ON_INVALID: &str = "failOnInvalid";
pub const FORCE_GEN: &str = "forceGen";
pub const VALUE_OVERRIDE: &str = "valueOverride";
pub const READ_OVERRIDE: &str = "readOverride";
pub const WRITE_OVERRIDE: &str = "writeOverride";
pub const REFRESH_OVERRIDE: &str = "refreshOverride";
pub const LENGTH_OVERRIDE: &str = "lengthOverride";
pub const VALID_OVERRIDE: &str = "validOverride";
pub const NAME_OVERRIDE: &str = "nameOverride";
pub const COPY_CODE_FROM: &str = "copyCodeFrom";
pub const REUSE_CODE: &str = "reuseCode";
pub const VALIDATE_MIN_LENGTH: &str = "validateMinLength";
pub const META: &str = "meta";
pub const REPLACE: &str = "replace";
pub const MEMBERS: &str = "members";

/// Properties accepted by every field kind.
pub const COMMON_PROPS: &[&str] = &[
    props::NAME,
    props::DISPLAY_NAME,
    props::DESCRIPTION,
    props::SINCE_VERSION,
    props::DEPRECATED,
    props::REMOVED,
    REUSE,
    SEMANTIC_TYPE,
    PSEUDO,
    FIXED_VALUE,
    DISPLAY_READ_ONLY,
    DISPLAY_HIDDEN,
    CUSTOMIZABLE,
    FAIL_ON_INVALID,
    FORCE_GEN,
    VALUE_OVERRIDE,
    READ_OVERRIDE,
    WRITE_OVERRIDE,
    REFRESH_OVERRIDE,
    LENGTH_OVERRIDE,
    VALID_OVERRIDE,
    NAME_OVERRIDE,
    COPY_CODE_FROM,
    REUSE_CODE,
    VALIDATE_MIN_LENGTH,
];

const COMMON_CHILDREN: &[&str] = &[META, REPLACE];

/// Wire kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Int,
    Enum,
    Set,
    Data,
    String,
    Bitfield,
    Bundle,
    List,
    Ref,
    Optional,
    Variant,
}

impl Kind {
    pub const ALL: [Kind; 11] = [
        Kind::Int,
        Kind::Enum,
        Kind::Set,
        Kind::Data,
        Kind::String,
        Kind::Bitfield,
        Kind::Bundle,
        Kind::List,
        Kind::Ref,
        Kind::Optional,
        Kind::Variant,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Int => "int",
            Kind::Enum => "enum",
            Kind::Set => "set",
            Kind::Data => "data",
            Kind::String => "string",
            Kind::Bitfield => "bitfield",
            Kind::Bundle => "bundle",
            Kind::List => "list",
            Kind::Ref => "ref",
            Kind::Optional => "optional",
            Kind::Variant => "variant",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// Element names of every field kind.
    pub fn names() -> &'static [&'static str] {
        &[
            "int", "enum", "set", "data", "string", "bitfield", "bundle", "list", "ref",
            "optional", "variant",
        ]
    }
}

/// Special role of a field, independent of its wire kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SemanticType {
    #[default]
    None,
    Version,
    MessageId,
    Length,
}

impl SemanticType {
    pub fn parse(value: &str) -> Option<SemanticType> {
        match value.to_ascii_lowercase().as_str() {
            "" | "none" => Some(SemanticType::None),
            "version" => Some(SemanticType::Version),
            "messageid" => Some(SemanticType::MessageId),
            "length" => Some(SemanticType::Length),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SemanticType::None => "none",
            SemanticType::Version => "version",
            SemanticType::MessageId => "messageId",
            SemanticType::Length => "length",
        }
    }
}

/// How generated code may override a piece of field functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OverrideType {
    #[default]
    Any,
    Replace,
    Extend,
    None,
}

impl OverrideType {
    pub fn parse(value: &str) -> Option<OverrideType> {
        match value.to_ascii_lowercase().as_str() {
            "" | "any" => Some(OverrideType::Any),
            "replace" => Some(OverrideType::Replace),
            "extend" => Some(OverrideType::Extend),
            "none" => Some(OverrideType::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overrides {
    pub value: OverrideType,
    pub read: OverrideType,
    pub write: OverrideType,
    pub refresh: OverrideType,
    pub length: OverrideType,
    pub valid: OverrideType,
    pub name: OverrideType,
}

/// Properties shared by every field kind.
#[derive(Debug, Clone)]
pub struct FieldCommon {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub versions: VersionWindow,
    pub semantic_type: SemanticType,
    pub pseudo: bool,
    pub fixed_value: bool,
    pub display_read_only: bool,
    pub display_hidden: bool,
    pub customizable: bool,
    pub fail_on_invalid: bool,
    pub force_gen: bool,
    pub overrides: Overrides,
    pub copy_code_from: String,
    pub validate_min_length: Option<usize>,
    pub extra: Extra,
    /// Direct member of a `bitfield`.
    pub in_bitfield: bool,
    pub schema: SchemaId,
    pub pos: SrcPos,
}

impl FieldCommon {
    fn new(schema: SchemaId, pos: SrcPos) -> Self {
        FieldCommon {
            name: String::new(),
            display_name: String::new(),
            description: String::new(),
            versions: VersionWindow::default(),
            semantic_type: SemanticType::None,
            pseudo: false,
            fixed_value: false,
            display_read_only: false,
            display_hidden: false,
            customizable: false,
            fail_on_invalid: false,
            force_gen: false,
            overrides: Overrides::default(),
            copy_code_from: String::new(),
            validate_min_length: None,
            extra: Extra::default(),
            in_bitfield: false,
            schema,
            pos,
        }
    }
}

/// Kind payload of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Int(IntField),
    Enum(EnumField),
    Set(SetField),
    Data(DataField),
    String(StringField),
    Bitfield(BitfieldField),
    Bundle(BundleField),
    List(ListField),
    Ref(RefField),
    Optional(OptionalField),
    Variant(VariantField),
}

macro_rules! dispatch {
    ($self:expr, $f:ident => $body:expr) => {
        match $self {
            FieldKind::Int($f) => $body,
            FieldKind::Enum($f) => $body,
            FieldKind::Set($f) => $body,
            FieldKind::Data($f) => $body,
            FieldKind::String($f) => $body,
            FieldKind::Bitfield($f) => $body,
            FieldKind::Bundle($f) => $body,
            FieldKind::List($f) => $body,
            FieldKind::Ref($f) => $body,
            FieldKind::Optional($f) => $body,
            FieldKind::Variant($f) => $body,
        }
    };
}

impl FieldKind {
    fn new(kind: Kind) -> FieldKind {
        match kind {
            Kind::Int => FieldKind::Int(IntField::default()),
            Kind::Enum => FieldKind::Enum(EnumField::default()),
            Kind::Set => FieldKind::Set(SetField::default()),
            Kind::Data => FieldKind::Data(DataField::default()),
            Kind::String => FieldKind::String(StringField::default()),
            Kind::Bitfield => FieldKind::Bitfield(BitfieldField::default()),
            Kind::Bundle => FieldKind::Bundle(BundleField::default()),
            Kind::List => FieldKind::List(ListField::default()),
            Kind::Ref => FieldKind::Ref(RefField::default()),
            Kind::Optional => FieldKind::Optional(OptionalField::default()),
            Kind::Variant => FieldKind::Variant(VariantField::default()),
        }
    }

    pub(crate) fn imp(&self) -> &dyn FieldImpl {
        dispatch!(self, f => f)
    }

    pub(crate) fn imp_mut(&mut self) -> &mut dyn FieldImpl {
        dispatch!(self, f => f)
    }
}

/// How a reference string designates (part of) a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRefType {
    Invalid,
    /// The field itself.
    Field,
    /// A named value inside the field (special, enum value, set bit).
    InnerValue,
    /// Serialized size of the field (`#` prefix).
    Size,
    /// Existence of the field (`?` prefix).
    Exists,
}

/// Result of resolving a reference relative to a field or a list of siblings.
#[derive(Debug, Clone, Copy)]
pub struct FieldRefInfo<'a> {
    pub field: Option<&'a Field>,
    pub value_name: &'a str,
    pub ref_type: FieldRefType,
}

impl<'a> FieldRefInfo<'a> {
    pub fn invalid() -> Self {
        FieldRefInfo {
            field: None,
            value_name: "",
            ref_type: FieldRefType::Invalid,
        }
    }

    pub(crate) fn inner_value(field: &'a Field, name: &'a str) -> Self {
        FieldRefInfo {
            field: Some(field),
            value_name: name,
            ref_type: FieldRefType::InnerValue,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.field.is_some() && self.ref_type != FieldRefType::Invalid
    }
}

/// Inputs available to a kind parser.
pub(crate) struct KindParse<'a> {
    pub props: &'a Props<'a>,
    pub ctx: ParseCtx<'a>,
    /// The field started as a copy of another one.
    pub reused: bool,
}

impl<'a> KindParse<'a> {
    pub fn node(&self) -> &'a XmlNode {
        self.props.node()
    }

    pub fn logger(&self) -> &'a Logger {
        self.ctx.logger
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.ctx.supports(feature)
    }

    pub fn error(&self, msg: impl AsRef<str>) -> DslError {
        props::semantic(self.ctx.logger, self.props.pos(), msg)
    }

    pub fn error_at(&self, node: &XmlNode, msg: impl AsRef<str>) -> DslError {
        props::semantic(self.ctx.logger, &node.pos, msg)
    }

    /// Error located at a member field.
    pub fn error_for(&self, field: &Field, msg: impl AsRef<str>) -> DslError {
        props::semantic(self.ctx.logger, &field.common.pos, msg)
    }

    pub fn structural(&self, msg: impl AsRef<str>) -> DslError {
        props::structural(self.ctx.logger, self.props.pos(), msg)
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        props::warn(self.ctx.logger, self.props.pos(), msg)
    }

    pub fn warn_at(&self, node: &XmlNode, msg: impl AsRef<str>) {
        props::warn(self.ctx.logger, &node.pos, msg)
    }

    pub fn unexpected(&self, prop: &str, value: &str) -> DslError {
        props::unexpected_value(self.ctx.logger, self.node(), prop, value)
    }

    pub fn single(&self, prop: &str) -> DslResult<Option<String>> {
        self.props.single(prop, self.ctx.logger)
    }

    /// Boolean property, ignored with a warning when the schema DSL version
    /// predates it.
    pub fn bool_prop(&self, prop: &str) -> DslResult<Option<bool>> {
        if !self.props.has(prop) {
            return Ok(None);
        }
        if !self.property_supported(prop) {
            return Ok(None);
        }
        self.props.bool_prop(prop, self.ctx.logger)
    }

    pub fn property_supported(&self, prop: &str) -> bool {
        let schema = self.ctx.schema_props();
        if schema.property_supported(prop) {
            return true;
        }
        self.warn(format!(
            "Property \"{}\" is not available for DSL version {}",
            prop, schema.dsl_version
        ));
        false
    }

    pub fn check_deprecated(&self, prop: &str) {
        let schema = self.ctx.schema_props();
        if self.props.has(prop) && schema.property_deprecated(prop) {
            self.warn(format!(
                "Property \"{}\" is deprecated in DSL version {}",
                prop, schema.dsl_version
            ));
        }
    }

    /// Context for members of the field being parsed.
    pub fn member_ctx(&self, kind: Kind, window: VersionWindow) -> ParseCtx<'a> {
        self.ctx.nested(Parent::Field(kind), window)
    }

    /// Detached (`$sibling`) prefixes need a bundle or message to look in.
    pub fn check_detached_prefix_allowed(&self) -> DslResult<()> {
        match self.ctx.parent {
            Parent::Message | Parent::Field(Kind::Bundle) => Ok(()),
            _ => Err(self.error(
                "Detached prefixes are allowed only for members of \"bundle\" field or \"message\" object.",
            )),
        }
    }

    /// String property value, resolving `^ref` string references.
    pub fn string_value(&self, prop: &str, value: &str) -> DslResult<String> {
        self.ctx
            .str_to_string_value(value)
            .ok_or_else(|| self.unexpected(prop, value))
    }
}

/// Per-kind behaviour driven by [`Field::create`] and the reference resolver.
pub(crate) trait FieldImpl {
    fn kind(&self) -> Kind;

    /// Properties that may also be written as child elements.
    fn extra_props(&self) -> &'static [&'static str] {
        &[]
    }

    /// Properties whose child element may instead hold a nested definition.
    fn possible_props(&self) -> &'static [&'static str] {
        &[]
    }

    /// Child elements that are not properties.
    fn extra_children(&self) -> &'static [&'static str] {
        &[]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()>;

    fn min_length(&self, reg: &Registry) -> usize;

    fn max_length(&self, reg: &Registry) -> usize {
        self.min_length(reg)
    }

    fn bit_length(&self, _common: &FieldCommon, _reg: &Registry) -> usize {
        0
    }

    fn members(&self) -> &[Field] {
        &[]
    }

    /// Kinds allowed inside `<replace>`; empty when replacement is unsupported.
    fn member_kinds(&self) -> &'static [Kind] {
        &[]
    }

    fn replace_members(&mut self, _members: Vec<Field>, p: &KindParse<'_>) -> DslResult<()> {
        Err(p.structural("The field does not support replacing its members."))
    }

    /// Error text when the field cannot act as a bitfield member of
    /// `bit_length` bits.
    fn validate_bit_length(&self, _bit_length: usize, _reg: &Registry) -> Result<(), String> {
        Err(format!(
            "The field of kind \"{}\" cannot be used or referenced as a member of \"bitfield\".",
            self.kind().as_str()
        ))
    }

    fn str_to_numeric(&self, _rest: &str, _reg: &Registry) -> Option<i128> {
        None
    }

    fn str_to_bool(&self, _rest: &str, _reg: &Registry) -> Option<bool> {
        None
    }

    fn str_to_string(&self, _rest: &str, _reg: &Registry) -> Option<String> {
        None
    }

    fn str_to_data(&self, _rest: &str, _reg: &Registry) -> Option<Vec<u8>> {
        None
    }

    fn semantic_type_allowed(&self, _ty: SemanticType, _ctx: &ParseCtx<'_>) -> bool {
        false
    }

    /// Resolve a non-empty reference inside a field without members.
    fn inner_ref<'a>(&'a self, _this: &'a Field, _rest: &'a str, _reg: &'a Registry) -> FieldRefInfo<'a> {
        FieldRefInfo::invalid()
    }

    fn valid_ref_type(&self, _ty: FieldRefType, _reg: &Registry) -> bool {
        false
    }

    /// Checks that need the fields defined before this one in the same
    /// bundle or message.
    fn verify_siblings(&self, _common: &FieldCommon, _siblings: &[Field], _ctx: &ParseCtx<'_>) -> DslResult<()> {
        Ok(())
    }

    fn comparable_to_value(&self, _val: &str, _ctx: &ParseCtx<'_>) -> bool {
        false
    }

    fn comparable_to_field(&self, _other: &Field, _reg: &Registry) -> bool {
        false
    }
}

/// Dependency of a field on another one.
#[derive(Debug, Clone, Copy)]
pub enum FieldLink<'a> {
    Owned(&'a Field),
    External(FieldId),
}

/// A field of any kind.
#[derive(Debug, Clone)]
pub struct Field {
    pub common: FieldCommon,
    pub kind: FieldKind,
}

macro_rules! kind_accessor {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub fn $name(&self) -> Option<&$ty> {
            match &self.kind {
                FieldKind::$variant(f) => Some(f),
                _ => None,
            }
        }
    };
}

impl Field {
    /// Create a field from its element. The element name selects the kind.
    pub fn create(node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<Field> {
        let logger = ctx.logger;
        let Some(kind) = Kind::from_name(&node.name) else {
            return Err(props::structural(
                logger,
                &node.pos,
                format!("Invalid field type \"{}\".", node.name),
            ));
        };

        let mut field = Field {
            common: FieldCommon::new(ctx.schema, node.pos.clone()),
            kind: FieldKind::new(kind),
        };

        let (extra_props, possible, extra_children) = {
            let imp = field.kind.imp();
            (imp.extra_props(), imp.possible_props(), imp.extra_children())
        };
        let mut child_props: Vec<&str> = COMMON_PROPS.to_vec();
        child_props.extend_from_slice(extra_props);
        let props = Props::with_possible(node, &child_props, possible);

        let reused = field.apply_reuse(&props, ctx)?;
        field.common.in_bitfield = ctx.parent == Parent::Field(Kind::Bitfield);
        field.common.pos = node.pos.clone();
        field.common.schema = ctx.schema;
        field.update_common(&props, ctx)?;

        let p = KindParse {
            props: &props,
            ctx,
            reused,
        };
        field.apply_replace(&p)?;

        let Field { common, kind: payload } = &mut field;
        payload.imp_mut().parse(common, &p)?;

        field.verify_semantic_type(ctx)?;
        field.verify_name(node, logger)?;
        field.verify_min_length(ctx)?;

        let extra = props.check_unknown(
            &[COMMON_PROPS, extra_props, possible],
            &[COMMON_CHILDREN, extra_children].concat(),
            logger,
        )?;
        field.common.extra.attrs.extend(extra.attrs);
        field.common.extra.children.extend(extra.children);

        tracing::trace!(target: "commsdsl", kind = kind.as_str(), name = %field.common.name, "field created");
        Ok(field)
    }

    /// Copy the state of the field named by `reuse`. Returns whether a copy
    /// took place.
    fn apply_reuse(&mut self, props: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<bool> {
        let logger = ctx.logger;
        let Some(target) = props.single(REUSE, logger)? else {
            return Ok(false);
        };
        let Some(other) = ctx.find_field(&target) else {
            return Err(props::semantic(
                logger,
                props.pos(),
                format!("The field \"{}\" hasn't been recorded yet.", target),
            ));
        };
        if other.kind() != self.kind() {
            return Err(props::semantic(
                logger,
                props.pos(),
                format!("Cannot reuse field of different kind (\"{}\").", target),
            ));
        }

        *self = other.clone();
        self.common.versions = VersionWindow::default();
        self.common.copy_code_from.clear();
        if props.has(REUSE_CODE) && ctx.schema_props().property_supported(REUSE_CODE) {
            if props.bool_prop(REUSE_CODE, logger)? == Some(true) {
                self.common.copy_code_from = target;
            }
        }
        Ok(true)
    }

    fn apply_replace(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let node = p.node();
        let replace: Vec<&XmlNode> = node.children_named(REPLACE).collect();
        if 1 < replace.len() {
            return Err(p.structural(format!(
                "Only single \"{}\" child element is supported for a field.",
                REPLACE
            )));
        }
        let Some(replace) = replace.first() else {
            return Ok(());
        };
        if !p.supports(Feature::MemberReplace) {
            p.warn(format!(
                "Replacing members with \"{}\" child element is unavaliable for selected DSL version, ignoring...",
                REPLACE
            ));
            return Ok(());
        }

        let allowed = self.kind.imp().member_kinds();
        let supported = replace.children.iter().all(|c| {
            Kind::from_name(&c.name)
                .map(|k| allowed.contains(&k))
                .unwrap_or(false)
        });
        if !supported {
            return Err(p.error_at(
                replace,
                format!(
                    "The \"{}\" child node element must contain only supported member fields.",
                    REPLACE
                ),
            ));
        }

        let ctx = p.member_ctx(self.kind(), self.common.versions);
        let members = replace
            .children
            .iter()
            .map(|c| Field::create(c, ctx))
            .collect::<DslResult<Vec<_>>>()?;
        self.kind.imp_mut().replace_members(members, p)
    }

    fn update_common(&mut self, props: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let node = props.node();
        let c = &mut self.common;

        if let Some(v) = props.single(props::NAME, logger)? {
            c.name = v;
        }
        if let Some(v) = props.single(props::DISPLAY_NAME, logger)? {
            c.display_name = ctx
                .str_to_string_value(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, props::DISPLAY_NAME, &v))?;
        }
        if let Some(v) = props.single(props::DESCRIPTION, logger)? {
            c.description = ctx
                .str_to_string_value(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, props::DESCRIPTION, &v))?;
        }

        c.versions = field_versions(props, ctx)?;

        if let Some(v) = props.single(SEMANTIC_TYPE, logger)? {
            c.semantic_type = SemanticType::parse(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, SEMANTIC_TYPE, &v))?;
        }

        let schema = ctx.schema_props();
        for (name, slot) in [
            (PSEUDO, &mut c.pseudo),
            (FIXED_VALUE, &mut c.fixed_value),
            (DISPLAY_READ_ONLY, &mut c.display_read_only),
            (DISPLAY_HIDDEN, &mut c.display_hidden),
            (CUSTOMIZABLE, &mut c.customizable),
            (FAIL_ON_INVALID, &mut c.fail_on_invalid),
            (FORCE_GEN, &mut c.force_gen),
        ] {
            if !props.has(name) {
                continue;
            }
            if !schema.property_supported(name) {
                props::warn(
                    logger,
                    props.pos(),
                    format!(
                        "Property \"{}\" is not available for DSL version {}",
                        name, schema.dsl_version
                    ),
                );
                continue;
            }
            if let Some(b) = props.bool_prop(name, logger)? {
                *slot = b;
            }
        }

        let o = &mut c.overrides;
        for (name, slot) in [
            (VALUE_OVERRIDE, &mut o.value),
            (READ_OVERRIDE, &mut o.read),
            (WRITE_OVERRIDE, &mut o.write),
            (REFRESH_OVERRIDE, &mut o.refresh),
            (LENGTH_OVERRIDE, &mut o.length),
            (VALID_OVERRIDE, &mut o.valid),
            (NAME_OVERRIDE, &mut o.name),
        ] {
            let Some(v) = props.single(name, logger)? else {
                *slot = OverrideType::Any;
                continue;
            };
            if !schema.supports(Feature::OverrideType) {
                props::warn(
                    logger,
                    props.pos(),
                    format!(
                        "The property \"{}\" is not supported for dslVersion={}.",
                        name, schema.dsl_version
                    ),
                );
                continue;
            }
            *slot = OverrideType::parse(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, name, &v))?;
        }

        if let Some(v) = props.single(COPY_CODE_FROM, logger)? {
            if !schema.property_supported(COPY_CODE_FROM) {
                props::warn(
                    logger,
                    props.pos(),
                    format!(
                        "The property \"{}\" is not supported for dslVersion={}.",
                        COPY_CODE_FROM, schema.dsl_version
                    ),
                );
            } else if ctx.find_field(&v).is_none() {
                return Err(props::semantic(
                    logger,
                    props.pos(),
                    format!(
                        "Field referenced by \"{}\" property ({}) is not found.",
                        COPY_CODE_FROM, v
                    ),
                ));
            } else {
                c.copy_code_from = v;
            }
        }

        if let Some(v) = props.single(VALIDATE_MIN_LENGTH, logger)? {
            if !schema.supports(Feature::ValidateMinLength) {
                props::warn(
                    logger,
                    props.pos(),
                    format!(
                        "Property \"{}\" for fields is not supported for DSL version {}, ignoring...",
                        VALIDATE_MIN_LENGTH, schema.dsl_version
                    ),
                );
            } else {
                c.validate_min_length = Some(
                    common::str_to_usize(&v)
                        .ok_or_else(|| props::unexpected_value(logger, node, VALIDATE_MIN_LENGTH, &v))?,
                );
            }
        }
        Ok(())
    }

    fn verify_semantic_type(&self, ctx: ParseCtx<'_>) -> DslResult<()> {
        let ty = self.common.semantic_type;
        if ty == SemanticType::None || self.kind.imp().semantic_type_allowed(ty, &ctx) {
            return Ok(());
        }
        let msg = match ty {
            SemanticType::Version => {
                "Semantic type \"version\" is applicable only to \"int\" fields or \"ref\" to them.".to_string()
            }
            SemanticType::MessageId => {
                "Semantic type \"messageId\" is applicable only to \"enum\" fields.".to_string()
            }
            _ if !ctx.supports(Feature::SemanticTypeLength) => format!(
                "Semantic type \"length\" supported only since DSL v{}, please update \"dslVersion\" property of your schema.",
                Feature::SemanticTypeLength.min_dsl_version()
            ),
            _ => "Semantic type \"length\" is not applicable to this field type.".to_string(),
        };
        Err(props::semantic(ctx.logger, &self.common.pos, msg))
    }

    fn verify_name(&self, node: &XmlNode, logger: &Logger) -> DslResult<()> {
        if self.common.name.is_empty() {
            return Err(props::structural(
                logger,
                &node.pos,
                format!(
                    "Missing value for mandatory property \"{}\" for \"{}\" element.",
                    props::NAME,
                    node.name
                ),
            ));
        }
        if !common::is_valid_name(&self.common.name) {
            return Err(props::structural(
                logger,
                &node.pos,
                format!("Invalid value for name property \"{}\".", self.common.name),
            ));
        }
        Ok(())
    }

    fn verify_min_length(&self, ctx: ParseCtx<'_>) -> DslResult<()> {
        let Some(expected) = self.common.validate_min_length else {
            return Ok(());
        };
        let len = self.min_length(ctx.registry);
        if len != expected {
            return Err(props::semantic(
                ctx.logger,
                &self.common.pos,
                format!(
                    "The calculated minimal length of the field is {} while expected is {} (specified with \"{}\" property).",
                    len, expected, VALIDATE_MIN_LENGTH
                ),
            ));
        }
        Ok(())
    }

    pub fn kind(&self) -> Kind {
        self.kind.imp().kind()
    }

    pub fn name(&self) -> &str {
        &self.common.name
    }

    pub fn display_name(&self) -> &str {
        &self.common.display_name
    }

    pub fn description(&self) -> &str {
        &self.common.description
    }

    pub fn versions(&self) -> VersionWindow {
        self.common.versions
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.common.semantic_type
    }

    pub fn is_pseudo(&self) -> bool {
        self.common.pseudo
    }

    pub fn min_length(&self, reg: &Registry) -> usize {
        self.kind.imp().min_length(reg)
    }

    pub fn max_length(&self, reg: &Registry) -> usize {
        self.kind.imp().max_length(reg)
    }

    /// Bits occupied inside a bitfield; 0 for fields outside one.
    pub fn bit_length(&self, reg: &Registry) -> usize {
        self.kind.imp().bit_length(&self.common, reg)
    }

    /// Member fields of composite kinds, in declaration order.
    pub fn members(&self) -> &[Field] {
        self.kind.imp().members()
    }

    /// Every field this one depends on: owned members and inner fields, plus
    /// fields defined elsewhere in the schema.
    pub fn links(&self) -> Vec<FieldLink<'_>> {
        let mut out: Vec<FieldLink<'_>> = self.members().iter().map(FieldLink::Owned).collect();
        let prefixes: Vec<&Prefix> = match &self.kind {
            FieldKind::Data(d) => vec![&d.prefix],
            FieldKind::String(s) => vec![&s.prefix],
            FieldKind::List(l) => {
                out.extend(l.element.link());
                vec![&l.count_prefix, &l.length_prefix, &l.elem_length_prefix, &l.term_suffix]
            }
            FieldKind::Optional(o) => {
                out.extend(o.field.link());
                Vec::new()
            }
            FieldKind::Ref(r) => {
                out.extend(r.target.map(FieldLink::External));
                Vec::new()
            }
            _ => Vec::new(),
        };
        for p in prefixes {
            match p {
                Prefix::External(id) => out.push(FieldLink::External(*id)),
                Prefix::Local(f) => out.push(FieldLink::Owned(f)),
                _ => {}
            }
        }
        out
    }

    pub(crate) fn validate_bit_length(&self, bit_length: usize, reg: &Registry) -> Result<(), String> {
        self.kind.imp().validate_bit_length(bit_length, reg)
    }

    kind_accessor!(as_int, Int, IntField);
    kind_accessor!(as_enum, Enum, EnumField);
    kind_accessor!(as_set, Set, SetField);
    kind_accessor!(as_data, Data, DataField);
    kind_accessor!(as_string, String, StringField);
    kind_accessor!(as_bitfield, Bitfield, BitfieldField);
    kind_accessor!(as_bundle, Bundle, BundleField);
    kind_accessor!(as_list, List, ListField);
    kind_accessor!(as_ref, Ref, RefField);
    kind_accessor!(as_optional, Optional, OptionalField);
    kind_accessor!(as_variant, Variant, VariantField);

    /// Follow `ref` fields down to the field that actually defines the kind.
    pub fn non_ref<'a>(&'a self, reg: &'a Registry) -> &'a Field {
        let mut field = self;
        while let Some(id) = field.as_ref().and_then(|r| r.target) {
            field = reg.field(id);
        }
        field
    }

    pub fn is_valid_ref_type(&self, ty: FieldRefType, reg: &Registry) -> bool {
        match ty {
            FieldRefType::Invalid => false,
            FieldRefType::Field => true,
            FieldRefType::Exists
                if 0 < self.common.versions.since
                    || self.common.versions.deprecated < NOT_YET_DEPRECATED =>
            {
                true
            }
            _ => self.kind.imp().valid_ref_type(ty, reg),
        }
    }

    /// Resolve `rest` relative to this field: empty designates the field
    /// itself, otherwise members or kind specific inner values.
    pub fn process_inner_ref<'a>(&'a self, rest: &'a str, reg: &'a Registry) -> FieldRefInfo<'a> {
        if rest.is_empty() {
            return FieldRefInfo {
                field: Some(self),
                value_name: "",
                ref_type: FieldRefType::Field,
            };
        }
        let members = self.members();
        if !members.is_empty() {
            return process_sibling_ref(members, rest, reg);
        }
        self.kind.imp().inner_ref(self, rest, reg)
    }

    pub fn str_to_numeric(&self, rest: &str, reg: &Registry) -> Option<i128> {
        match self.member_for(rest) {
            Some((m, tail)) => m.str_to_numeric(tail, reg),
            None => self.kind.imp().str_to_numeric(rest, reg),
        }
    }

    pub fn str_to_bool(&self, rest: &str, reg: &Registry) -> Option<bool> {
        match self.member_for(rest) {
            Some((m, tail)) => m.str_to_bool(tail, reg),
            None => self.kind.imp().str_to_bool(rest, reg),
        }
    }

    pub fn str_to_string(&self, rest: &str, reg: &Registry) -> Option<String> {
        match self.member_for(rest) {
            Some((m, tail)) => m.str_to_string(tail, reg),
            None => self.kind.imp().str_to_string(rest, reg),
        }
    }

    pub fn str_to_data(&self, rest: &str, reg: &Registry) -> Option<Vec<u8>> {
        match self.member_for(rest) {
            Some((m, tail)) => m.str_to_data(tail, reg),
            None => self.kind.imp().str_to_data(rest, reg),
        }
    }

    /// Member named by the first segment of `rest`, for composite kinds.
    fn member_for<'s, 'r>(&'s self, rest: &'r str) -> Option<(&'s Field, &'r str)> {
        let members = self.members();
        if rest.is_empty() || members.is_empty() {
            return None;
        }
        let (first, tail) = common::split_first(rest);
        members.iter().find(|m| m.name() == first).map(|m| (m, tail))
    }

    pub fn is_comparable_to_value(&self, val: &str, ctx: &ParseCtx<'_>) -> bool {
        if matches!(
            self.common.semantic_type,
            SemanticType::Version | SemanticType::Length
        ) {
            return common::str_to_int(val).is_some();
        }
        self.kind.imp().comparable_to_value(val, ctx)
    }

    pub fn is_comparable_to_field(&self, other: &Field, reg: &Registry) -> bool {
        if let Some(id) = other.as_ref().and_then(|r| r.target) {
            return self.is_comparable_to_field(reg.field(id), reg);
        }
        if self.kind() == other.kind() {
            return true;
        }
        self.kind.imp().comparable_to_field(other, reg)
    }

    /// Checks against the fields preceding this one in a bundle or message.
    pub fn verify_siblings(&self, siblings: &[Field], ctx: &ParseCtx<'_>) -> DslResult<()> {
        self.kind.imp().verify_siblings(&self.common, siblings, ctx)
    }

    /// Locate a (possibly nested, dotted) sibling by name, logging an error
    /// when it is missing.
    pub(crate) fn find_sibling<'a>(
        &self,
        siblings: &'a [Field],
        name: &str,
        logger: &Logger,
    ) -> Option<&'a Field> {
        let mut fields = siblings;
        let mut rest = name;
        loop {
            let (first, tail) = common::split_first(rest);
            let Some(found) = fields.iter().find(|f| f.name() == first) else {
                props::semantic(
                    logger,
                    &self.common.pos,
                    format!(
                        "The holding bundle/message does not contain field named \"{}\".",
                        name
                    ),
                );
                return None;
            };
            if tail.is_empty() {
                return Some(found);
            }
            fields = found.members();
            rest = tail;
        }
    }
}

/// Resolve a reference against a list of sibling fields. A leading `#`
/// designates the size of the field, a leading `?` its existence.
pub fn process_sibling_ref<'a>(siblings: &'a [Field], reference: &'a str, reg: &'a Registry) -> FieldRefInfo<'a> {
    let prefixed = reference
        .strip_prefix('#')
        .map(|r| (r, FieldRefType::Size))
        .or_else(|| reference.strip_prefix('?').map(|r| (r, FieldRefType::Exists)));
    if let Some((inner, ty)) = prefixed {
        let info = process_sibling_ref(siblings, inner, reg);
        let Some(field) = info.field else {
            return FieldRefInfo::invalid();
        };
        if info.ref_type != FieldRefType::Field || !field.is_valid_ref_type(ty, reg) {
            return FieldRefInfo::invalid();
        }
        return FieldRefInfo {
            field: Some(field),
            value_name: "",
            ref_type: ty,
        };
    }

    let (first, rest) = common::split_first(reference);
    if first.is_empty() {
        return FieldRefInfo::invalid();
    }
    match siblings.iter().find(|f| f.name() == first) {
        Some(f) => f.process_inner_ref(rest, reg),
        None => FieldRefInfo::invalid(),
    }
}

/// Version window of a field given where it is declared. Members of fields and
/// messages inherit their parent's window; elsewhere explicit stamps are ignored.
fn field_versions(props: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<VersionWindow> {
    let logger = ctx.logger;
    let inherits = matches!(ctx.parent, Parent::Field(_) | Parent::Message);
    let parent = if inherits {
        ctx.window
    } else {
        VersionWindow::default()
    };
    let mut window = props::get_and_check_versions(props, parent, ctx.schema_props().version, logger)?;
    if !inherits {
        if window.since != 0 {
            props::warn(
                logger,
                props.pos(),
                format!(
                    "Property \"{}\" is not applicable to this field, ignoring provided value",
                    props::SINCE_VERSION
                ),
            );
            window.since = 0;
        }
        if window.deprecated != NOT_YET_DEPRECATED {
            props::warn(
                logger,
                props.pos(),
                format!(
                    "Property \"{}\" is not applicable to this field, ignoring provided value",
                    props::DEPRECATED
                ),
            );
            window.deprecated = NOT_YET_DEPRECATED;
        }
    }
    if window.removed && window.deprecated == NOT_YET_DEPRECATED {
        props::warn(
            logger,
            props.pos(),
            format!(
                "Property \"{}\" is not applicable to non deprecated fields",
                props::REMOVED
            ),
        );
    }
    Ok(window)
}

/// Create every field element among `nodes`, checking each against the ones
/// before it and rejecting duplicate names.
pub(crate) fn create_members<'n>(
    nodes: impl IntoIterator<Item = &'n XmlNode>,
    ctx: ParseCtx<'_>,
    existing: Vec<Field>,
) -> DslResult<Vec<Field>> {
    let mut members = existing;
    for node in nodes {
        let field = Field::create(node, ctx)?;
        field.verify_siblings(&members, &ctx)?;
        members.push(field);
    }
    validate_member_names(&members, ctx.logger)?;
    Ok(members)
}

pub(crate) fn validate_member_names(fields: &[Field], logger: &Logger) -> DslResult<()> {
    for (idx, f) in fields.iter().enumerate() {
        if fields[..idx].iter().any(|prev| prev.name() == f.name()) {
            return Err(props::structural(
                logger,
                &f.common.pos,
                format!("Member field with name \"{}\" has already been defined.", f.name()),
            ));
        }
    }
    Ok(())
}

/// Replace members by name, as requested by a `<replace>` element.
pub(crate) fn replace_by_name(
    members: &mut [Field],
    replacements: Vec<Field>,
    logger: &Logger,
) -> DslResult<()> {
    for r in replacements {
        let Some(slot) = members.iter_mut().find(|m| m.name() == r.name()) else {
            return Err(props::semantic(
                logger,
                &r.common.pos,
                format!("Cannot find reused member with name \"{}\" to replace.", r.name()),
            ));
        };
        *slot = r;
    }
    Ok(())
}

/// Member definitions of a composite field: either every child inside a
/// single `<members>` element, or field elements placed directly. Mixing both
/// or mixing stand-alone members with other property elements is rejected.
pub(crate) fn member_nodes<'a>(p: &KindParse<'a>, allowed: &[Kind]) -> DslResult<Vec<&'a XmlNode>> {
    field_nodes(p.node(), MEMBERS, allowed, p.logger())
}

/// Field definitions of `node`, placed directly or grouped in a single
/// `group` child (`members` for fields, `fields` for messages and interfaces).
pub(crate) fn field_nodes<'a>(
    node: &'a XmlNode,
    group: &str,
    allowed: &[Kind],
    logger: &Logger,
) -> DslResult<Vec<&'a XmlNode>> {
    let owner = node.name.as_str();
    let is_allowed = |n: &XmlNode| {
        Kind::from_name(&n.name)
            .map(|k| allowed.contains(&k))
            .unwrap_or(false)
    };
    let groups: Vec<&XmlNode> = node.children_named(group).collect();
    if 1 < groups.len() {
        return Err(props::structural(
            logger,
            &node.pos,
            format!(
                "Only single \"{}\" child element is supported for \"{}\".",
                group, owner
            ),
        ));
    }
    let direct: Vec<&XmlNode> = node.children.iter().filter(|c| is_allowed(c)).collect();
    if let Some(holder) = groups.first() {
        if !direct.is_empty() {
            return Err(props::structural(
                logger,
                &node.pos,
                format!(
                    "The \"{}\" element does not support list of stand alone member fields as child elements together with \"{}\" child element.",
                    owner, group
                ),
            ));
        }
        if !holder.children.iter().all(|c| is_allowed(c)) {
            return Err(props::semantic(
                logger,
                &holder.pos,
                format!(
                    "The \"{}\" child node of \"{}\" element must contain only supported types.",
                    group, owner
                ),
            ));
        }
        return Ok(holder.children.iter().collect());
    }
    let others = node
        .children
        .iter()
        .filter(|c| !is_allowed(c) && !c.name.contains('.') && c.name != META && c.name != REPLACE)
        .count();
    if !direct.is_empty() && 0 < others {
        return Err(props::structural(
            logger,
            &node.pos,
            format!(
                "The member types of \"{}\" must be defined inside \"<{}>\" child element when there are other property describing children.",
                owner, group
            ),
        ));
    }
    Ok(direct)
}

/// Field wrapped by a `list` (its element) or an `optional`.
#[derive(Debug, Clone, Default)]
pub enum InnerField {
    #[default]
    Missing,
    External(FieldId),
    Local(Box<Field>),
}

impl InnerField {
    pub fn field<'a>(&'a self, reg: &'a Registry) -> Option<&'a Field> {
        match self {
            InnerField::Missing => None,
            InnerField::External(id) => Some(reg.field(*id)),
            InnerField::Local(f) => Some(f),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, InnerField::Missing)
    }

    pub fn link(&self) -> Option<FieldLink<'_>> {
        match self {
            InnerField::Missing => None,
            InnerField::External(id) => Some(FieldLink::External(*id)),
            InnerField::Local(f) => Some(FieldLink::Owned(f)),
        }
    }
}

/// Definition of the single field wrapped by a `list` or `optional`: a field
/// element placed directly, or the single field inside the `wrapper` child.
/// `in_props` tells that the wrapped field was already given as a reference.
pub(crate) fn inline_field_node<'a>(
    p: &KindParse<'a>,
    wrapper: &str,
    in_props: bool,
) -> DslResult<Option<&'a XmlNode>> {
    wrapped_field_node(p.node(), wrapper, in_props, p.logger())
}

/// Same as [`inline_field_node`] for any owner element (frame layers included).
pub(crate) fn wrapped_field_node<'a>(
    node: &'a XmlNode,
    wrapper: &str,
    in_props: bool,
    logger: &Logger,
) -> DslResult<Option<&'a XmlNode>> {
    let owner = node.name.as_str();
    let structural = |msg: String| props::structural(logger, &node.pos, msg);
    let wrappers: Vec<&XmlNode> = node.children_named(wrapper).collect();
    if 1 < wrappers.len() {
        return Err(structural(format!("There must be only one occurance of \"{}\".", wrapper)));
    }
    let direct: Vec<&XmlNode> = node
        .children
        .iter()
        .filter(|c| Kind::from_name(&c.name).is_some())
        .collect();
    if !wrappers.is_empty() && !direct.is_empty() {
        return Err(structural(format!(
            "The \"{}\" element does not support stand alone field as child element together with \"{}\" child element.",
            owner, wrapper
        )));
    }
    let duplicate = || {
        structural(format!(
            "There must be only one occurance of \"{}\" definition.",
            wrapper
        ))
    };

    if let Some(first) = direct.first() {
        if 1 < direct.len() {
            return Err(structural(format!(
                "The \"{}\" element is expected to define only single field",
                owner
            )));
        }
        let others = node
            .children
            .iter()
            .filter(|c| Kind::from_name(&c.name).is_none() && !c.name.contains('.'))
            .filter(|c| c.name != META && c.name != REPLACE)
            .count();
        if 0 < others {
            return Err(structural(format!(
                "The field type of \"{}\" must be defined inside \"<{}>\" child element when there are other property describing children.",
                owner, wrapper
            )));
        }
        if in_props {
            return Err(duplicate());
        }
        return Ok(Some(*first));
    }

    let Some(holder) = wrappers.first() else {
        return Ok(None);
    };
    let fields: Vec<&XmlNode> = holder
        .children
        .iter()
        .filter(|c| !c.name.contains('.'))
        .collect();
    if 1 < fields.len() {
        return Err(props::semantic(
            logger,
            &holder.pos,
            format!("The \"{}\" element is expected to define only single field", wrapper),
        ));
    }
    match fields.first() {
        // The reference was given as the wrapper value.
        None if in_props => Ok(None),
        None => Err(props::semantic(
            logger,
            &holder.pos,
            format!("The \"{}\" node is expected to define field as child element", wrapper),
        )),
        Some(_) if in_props => Err(duplicate()),
        Some(f) => Ok(Some(*f)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        for k in Kind::ALL {
            assert_eq!(Kind::from_name(k.as_str()), Some(k));
        }
        assert_eq!(Kind::from_name("float"), None);
        assert_eq!(Kind::names().len(), Kind::ALL.len());
    }

    #[test]
    fn semantic_and_override_names() {
        assert_eq!(SemanticType::parse("MessageId"), Some(SemanticType::MessageId));
        assert_eq!(SemanticType::parse(""), Some(SemanticType::None));
        assert_eq!(SemanticType::parse("size"), None);
        assert_eq!(OverrideType::parse("Extend"), Some(OverrideType::Extend));
        assert_eq!(OverrideType::parse("all"), None);
    }
}
