//! `<message>` definitions: an identified, ordered list of fields.

use crate::alias::{self, Alias, ALIAS};
use crate::common;
use crate::error::DslResult;
use crate::field::{
    self, Field, Kind, OverrideType, Overrides, COPY_CODE_FROM, CUSTOMIZABLE, FAIL_ON_INVALID,
    LENGTH_OVERRIDE, NAME_OVERRIDE, READ_OVERRIDE, REFRESH_OVERRIDE, REPLACE, REUSE, REUSE_CODE,
    VALIDATE_MIN_LENGTH, VALID_OVERRIDE, WRITE_OVERRIDE,
};
use crate::props::{self, Extra, Props};
use crate::registry::{ParseCtx, Parent, Registry, SchemaId};
use crate::schema::Feature;
use crate::version::{VersionWindow, NOT_YET_DEPRECATED};
use crate::xml::{SrcPos, XmlNode};

pub const MESSAGE: &str = "message";
pub const MESSAGES: &str = "messages";
pub const FIELDS: &str = "fields";
pub const ID: &str = "id";
pub const ORDER: &str = "order";
pub const PLATFORMS: &str = "platforms";
pub const SENDER: &str = "sender";
pub const COPY_FIELDS_FROM: &str = "copyFieldsFrom";
pub const COPY_FIELDS_ALIASES: &str = "copyFieldsAliases";
pub const REUSE_ALIASES: &str = "reuseAliases";

const PROP_NAMES: &[&str] = &[
    props::NAME,
    ID,
    props::DISPLAY_NAME,
    props::DESCRIPTION,
    props::SINCE_VERSION,
    props::DEPRECATED,
    props::REMOVED,
    COPY_FIELDS_FROM,
    COPY_FIELDS_ALIASES,
    ORDER,
    PLATFORMS,
    CUSTOMIZABLE,
    SENDER,
    VALIDATE_MIN_LENGTH,
    READ_OVERRIDE,
    WRITE_OVERRIDE,
    REFRESH_OVERRIDE,
    LENGTH_OVERRIDE,
    VALID_OVERRIDE,
    NAME_OVERRIDE,
    COPY_CODE_FROM,
    FAIL_ON_INVALID,
    REUSE,
    REUSE_CODE,
    REUSE_ALIASES,
];

/// Side of the link sending the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sender {
    #[default]
    Both,
    Client,
    Server,
}

impl Sender {
    pub fn parse(value: &str) -> Option<Sender> {
        match value.to_ascii_lowercase().as_str() {
            "both" => Some(Sender::Both),
            "client" => Some(Sender::Client),
            "server" => Some(Sender::Server),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub id: i128,
    /// Tie break between messages sharing an id.
    pub order: u32,
    pub versions: VersionWindow,
    /// Platforms the message applies to; empty means all.
    pub platforms: Vec<String>,
    pub sender: Sender,
    pub customizable: bool,
    pub fail_on_invalid: bool,
    pub validate_min_length: Option<usize>,
    pub fields: Vec<Field>,
    pub aliases: Vec<Alias>,
    pub overrides: Overrides,
    pub copy_code_from: String,
    pub extra: Extra,
    pub schema: SchemaId,
    pub pos: SrcPos,
}

/// Source of fields named by `copyFieldsFrom`.
enum CopySource<'a> {
    Message(&'a Message),
    Bundle(&'a Field),
}

impl<'a> CopySource<'a> {
    fn fields(&self) -> &'a [Field] {
        match self {
            CopySource::Message(m) => &m.fields,
            CopySource::Bundle(b) => b.members(),
        }
    }

    fn aliases(&self) -> &'a [Alias] {
        match self {
            CopySource::Message(m) => &m.aliases,
            CopySource::Bundle(b) => b.as_bundle().map(|b| b.aliases.as_slice()).unwrap_or(&[]),
        }
    }
}

impl Message {
    fn new(schema: SchemaId, pos: SrcPos) -> Self {
        Message {
            name: String::new(),
            display_name: String::new(),
            description: String::new(),
            id: 0,
            order: 0,
            versions: VersionWindow::default(),
            platforms: Vec::new(),
            sender: Sender::Both,
            customizable: false,
            fail_on_invalid: false,
            validate_min_length: None,
            fields: Vec::new(),
            aliases: Vec::new(),
            overrides: Overrides::default(),
            copy_code_from: String::new(),
            extra: Extra::default(),
            schema,
            pos,
        }
    }

    pub fn create(node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<Message> {
        let logger = ctx.logger;
        let p = Props::new(node, PROP_NAMES);
        let mut msg = Message::new(ctx.schema, node.pos.clone());

        msg.apply_reuse(&p, ctx)?;
        msg.update_name(&p, ctx)?;
        msg.update_versions(&p, ctx)?;
        msg.update_platforms(&p, ctx)?;
        msg.update_flags(&p, ctx)?;
        let source = msg.copy_fields(&p, ctx)?;
        msg.replace_fields(node, ctx)?;
        msg.update_fields(node, ctx)?;
        msg.copy_aliases(&p, ctx, source)?;
        msg.aliases = alias::update_aliases(node, &ctx, std::mem::take(&mut msg.aliases), &msg.fields)?;
        msg.update_overrides(&p, ctx)?;

        let mut known_children: Vec<&str> = Kind::names().to_vec();
        known_children.extend_from_slice(&[FIELDS, ALIAS, REPLACE, field::META]);
        msg.extra = p.check_unknown(&[PROP_NAMES], &known_children, logger)?;

        tracing::trace!(target: "commsdsl", name = %msg.name, id = %msg.id, "message created");
        Ok(msg)
    }

    fn apply_reuse(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let Some(target) = p.single(REUSE, logger)? else {
            return Ok(());
        };
        if !ctx.supports(Feature::MessageReuse) {
            props::warn(
                logger,
                p.pos(),
                format!(
                    "Property \"{}\" is not supported for <message> in DSL version {}, ignoring...",
                    REUSE,
                    ctx.schema_props().dsl_version
                ),
            );
            return Ok(());
        }
        let Some(other) = ctx.find_message(&target) else {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("The message \"{}\" hasn't been recorded yet.", target),
            ));
        };
        let pos = self.pos.clone();
        *self = other.clone();
        self.pos = pos;
        self.schema = ctx.schema;
        if p.bool_prop(REUSE_ALIASES, logger)? == Some(false) {
            self.aliases.clear();
        }
        self.copy_code_from.clear();
        if p.bool_prop(REUSE_CODE, logger)? == Some(true) {
            self.copy_code_from = target;
        }
        Ok(())
    }

    fn update_name(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let node = p.node();
        match p.single(props::NAME, logger)? {
            Some(v) => self.name = v,
            None if self.name.is_empty() => {
                return Err(props::structural(
                    logger,
                    p.pos(),
                    format!(
                        "Missing value for mandatory property \"{}\" for \"{}\" element.",
                        props::NAME,
                        MESSAGE
                    ),
                ));
            }
            None => {}
        }
        if !common::is_valid_name(&self.name) {
            return Err(props::structural(
                logger,
                p.pos(),
                format!("Invalid value for name property \"{}\".", self.name),
            ));
        }
        if let Some(v) = p.single(props::DISPLAY_NAME, logger)? {
            self.display_name = ctx
                .str_to_string_value(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, props::DISPLAY_NAME, &v))?;
        }
        if let Some(v) = p.single(props::DESCRIPTION, logger)? {
            self.description = ctx
                .str_to_string_value(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, props::DESCRIPTION, &v))?;
        }

        let id = p.required(ID, logger)?;
        self.id = ctx
            .str_to_enum_value(&id)
            .or_else(|| common::str_to_int(&id).filter(|v| 0 <= *v))
            .ok_or_else(|| props::unexpected_value(logger, node, ID, &id))?;

        if let Some(v) = p.single(ORDER, logger)? {
            self.order = common::str_to_unsigned(&v).ok_or_else(|| props::unexpected_value(logger, node, ORDER, &v))?;
        }
        Ok(())
    }

    fn update_versions(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let window = props::get_and_check_versions(
            p,
            VersionWindow::default(),
            ctx.schema_props().version,
            logger,
        )?;
        if window.removed && window.deprecated == NOT_YET_DEPRECATED {
            props::warn(
                logger,
                p.pos(),
                format!(
                    "Property \"{}\" is not applicable to non deprecated fields",
                    props::REMOVED
                ),
            );
        }
        self.versions = window;
        Ok(())
    }

    /// `platforms="+a,b"` restricts the message to the listed platforms,
    /// `-a,b` to every declared platform except the listed ones.
    fn update_platforms(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let node = p.node();
        let Some(v) = p.single(PLATFORMS, logger)? else {
            return Ok(());
        };
        let unexpected = || props::unexpected_value(logger, node, PLATFORMS, &v);
        let (include, list) = match v.chars().next() {
            Some('+') => (true, &v[1..]),
            Some('-') => (false, &v[1..]),
            _ => return Err(unexpected()),
        };
        let mut names: Vec<String> = Vec::new();
        for name in list.split(',') {
            let name = name.trim();
            if name.is_empty() {
                return Err(unexpected());
            }
            names.push(name.to_string());
        }

        let all = &ctx.current_schema().platforms;
        if let Some(missing) = names.iter().find(|n| all.binary_search(*n).is_err()) {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("Platform \"{}\" hasn't been defined.", missing),
            ));
        }
        names.sort();
        names.dedup();

        if include {
            self.platforms = names;
            return Ok(());
        }
        self.platforms = all
            .iter()
            .filter(|name| names.binary_search(*name).is_err())
            .cloned()
            .collect();
        if self.platforms.is_empty() {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("Message \"{}\" is not supported in any platform.", self.name),
            ));
        }
        Ok(())
    }

    fn update_flags(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let node = p.node();
        let schema = ctx.schema_props();
        if let Some(b) = p.bool_prop(CUSTOMIZABLE, logger)? {
            self.customizable = b;
        }
        if let Some(v) = p.single(SENDER, logger)? {
            self.sender = Sender::parse(&v).ok_or_else(|| props::unexpected_value(logger, node, SENDER, &v))?;
        }
        if let Some(v) = p.single(VALIDATE_MIN_LENGTH, logger)? {
            if schema.property_supported(VALIDATE_MIN_LENGTH) {
                self.validate_min_length = Some(
                    common::str_to_usize(&v)
                        .ok_or_else(|| props::unexpected_value(logger, node, VALIDATE_MIN_LENGTH, &v))?,
                );
            } else {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "Property \"{}\" is not supported for DSL version {}, ignoring...",
                        VALIDATE_MIN_LENGTH, schema.dsl_version
                    ),
                );
            }
        }
        if let Some(b) = p.bool_prop(FAIL_ON_INVALID, logger)? {
            if b && !schema.supports(Feature::FailOnInvalidInMessage) {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "Property \"{}\" is not supported for DSL version {}, ignoring...",
                        FAIL_ON_INVALID, schema.dsl_version
                    ),
                );
            } else {
                self.fail_on_invalid = b;
            }
        }
        Ok(())
    }

    fn copy_fields<'c>(&mut self, p: &Props<'_>, ctx: ParseCtx<'c>) -> DslResult<Option<CopySource<'c>>> {
        let logger = ctx.logger;
        let Some(reference) = p.single(COPY_FIELDS_FROM, logger)? else {
            return Ok(None);
        };
        if !self.fields.is_empty() {
            return Err(props::semantic(
                logger,
                p.pos(),
                "Copying fields from multiple sources using various properties is not supported",
            ));
        }
        let source = match ctx.find_message(&reference) {
            Some(m) => CopySource::Message(m),
            None if !ctx.supports(Feature::CopyFieldsFromBundle) => {
                return Err(props::semantic(
                    logger,
                    p.pos(),
                    format!("Invalid reference to other message \"{}\".", reference),
                ));
            }
            None => match ctx.find_field(&reference) {
                Some(f) if f.kind() == Kind::Bundle => CopySource::Bundle(f),
                _ => {
                    return Err(props::semantic(
                        logger,
                        p.pos(),
                        format!("Invalid reference to other message or bundle \"{}\".", reference),
                    ));
                }
            },
        };

        let since = self.versions.since;
        self.fields = source
            .fields()
            .iter()
            .filter(|f| !(f.common.versions.removed && f.common.versions.deprecated <= since))
            .cloned()
            .map(|mut f| {
                f.common.versions.since = f.common.versions.since.max(since);
                f
            })
            .collect();
        Ok(Some(source))
    }

    fn replace_fields(&mut self, node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let replace: Vec<&XmlNode> = node.children_named(REPLACE).collect();
        if 1 < replace.len() {
            return Err(props::structural(
                logger,
                &node.pos,
                format!(
                    "Only single \"{}\" child element is supported for \"{}\".",
                    REPLACE, MESSAGE
                ),
            ));
        }
        let Some(replace) = replace.first() else {
            return Ok(());
        };
        if !ctx.supports(Feature::MemberReplace) {
            props::warn(
                logger,
                &node.pos,
                format!(
                    "Replacing fields with \"{}\" child element is unavaliable for selected DSL version, ignoring...",
                    REPLACE
                ),
            );
            return Ok(());
        }
        if !replace.children.iter().all(|c| Kind::from_name(&c.name).is_some()) {
            return Err(props::semantic(
                logger,
                &replace.pos,
                format!(
                    "The \"{}\" child node of \"{}\" element must contain only supported field types.",
                    REPLACE, MESSAGE
                ),
            ));
        }
        let fctx = ctx.nested(Parent::Message, self.versions);
        let mut replacements = Vec::new();
        for c in &replace.children {
            let f = Field::create(c, fctx)?;
            f.verify_siblings(&self.fields, &fctx)?;
            replacements.push(f);
        }
        field::replace_by_name(&mut self.fields, replacements, logger)
    }

    fn update_fields(&mut self, node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<()> {
        let nodes = field::field_nodes(node, FIELDS, &Kind::ALL, ctx.logger)?;
        if nodes.is_empty() {
            return Ok(());
        }
        let fctx = ctx.nested(Parent::Message, self.versions);
        self.fields = field::create_members(nodes, fctx, std::mem::take(&mut self.fields))?;

        if let Some(expected) = self.validate_min_length {
            let len = self.min_length(ctx.registry);
            if len != expected {
                return Err(props::semantic(
                    ctx.logger,
                    &node.pos,
                    format!(
                        "The calculated minimal length of the message is {} while expected is {} (specified with \"{}\" property).",
                        len, expected, VALIDATE_MIN_LENGTH
                    ),
                ));
            }
        }
        Ok(())
    }

    fn copy_aliases(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>, source: Option<CopySource<'_>>) -> DslResult<()> {
        let logger = ctx.logger;
        let given = p.has(COPY_FIELDS_ALIASES);
        if !ctx.supports(Feature::FieldAlias) {
            if given {
                return Err(props::structural(
                    logger,
                    p.pos(),
                    format!("Unexpected property \"{}\".", COPY_FIELDS_ALIASES),
                ));
            }
            return Ok(());
        }
        if p.bool_prop(COPY_FIELDS_ALIASES, logger)? == Some(false) {
            return Ok(());
        }
        let Some(source) = source else {
            if given {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "Property \"{}\" is inapplicable without \"{}\".",
                        COPY_FIELDS_ALIASES, COPY_FIELDS_FROM
                    ),
                );
            }
            return Ok(());
        };
        // Aliases whose fields were not copied are dropped by `update_aliases`.
        self.aliases.extend(source.aliases().iter().cloned());
        Ok(())
    }

    fn update_overrides(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<()> {
        let logger = ctx.logger;
        let node = p.node();
        let schema = ctx.schema_props();
        let o = &mut self.overrides;
        for (name, slot) in [
            (READ_OVERRIDE, &mut o.read),
            (WRITE_OVERRIDE, &mut o.write),
            (REFRESH_OVERRIDE, &mut o.refresh),
            (LENGTH_OVERRIDE, &mut o.length),
            (VALID_OVERRIDE, &mut o.valid),
            (NAME_OVERRIDE, &mut o.name),
        ] {
            let Some(v) = p.single(name, logger)? else {
                continue;
            };
            if !schema.supports(Feature::OverrideType) {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "The property \"{}\" is not supported for dslVersion={}.",
                        name, schema.dsl_version
                    ),
                );
                continue;
            }
            *slot = OverrideType::parse(&v).ok_or_else(|| props::unexpected_value(logger, node, name, &v))?;
        }

        if let Some(v) = p.single(COPY_CODE_FROM, logger)? {
            if !schema.property_supported(COPY_CODE_FROM) {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "The property \"{}\" is not supported for dslVersion={}.",
                        COPY_CODE_FROM, schema.dsl_version
                    ),
                );
            } else if ctx.find_message(&v).is_none() {
                return Err(props::semantic(
                    logger,
                    p.pos(),
                    format!(
                        "Message referenced by \"{}\" property ({}) is not found.",
                        COPY_CODE_FROM, v
                    ),
                ));
            } else {
                self.copy_code_from = v;
            }
        }
        Ok(())
    }

    /// Fields introduced after the message itself may be missing.
    pub fn min_length(&self, reg: &Registry) -> usize {
        self.fields
            .iter()
            .filter(|f| f.common.versions.since <= self.versions.since)
            .fold(0, |acc, f| common::add_length(acc, f.min_length(reg)))
    }

    pub fn max_length(&self, reg: &Registry) -> usize {
        self.fields
            .iter()
            .fold(0, |acc, f| common::add_length(acc, f.max_length(reg)))
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

/// Check message id uniqueness across every namespace of `schema`. With
/// `allow_non_unique`, messages sharing an id must differ in `order`.
pub fn validate_all_messages(
    reg: &Registry,
    schema: SchemaId,
    allow_non_unique: bool,
    logger: &crate::diag::Logger,
) -> DslResult<()> {
    let mut all: Vec<_> = reg
        .message_ids()
        .map(|id| reg.message_entry(id))
        .filter(|e| e.schema == schema)
        .collect();
    all.sort_by_key(|e| (e.value.id, e.value.order));

    for pair in all.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.value.id != b.value.id {
            continue;
        }
        if !allow_non_unique {
            return Err(props::semantic(
                logger,
                &b.value.pos,
                format!(
                    "Messages \"{}\" and \"{}\" have the same id: {}",
                    a.ext_ref, b.ext_ref, a.value.id
                ),
            ));
        }
        if a.value.order == b.value.order {
            return Err(props::semantic(
                logger,
                &b.value.pos,
                format!(
                    "Messages \"{}\" and \"{}\" have the same \"{}\" and \"{}\" values.",
                    a.ext_ref, b.ext_ref, ID, ORDER
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sender_names() {
        assert_eq!(Sender::parse("Client"), Some(Sender::Client));
        assert_eq!(Sender::parse("both"), Some(Sender::Both));
        assert_eq!(Sender::parse("peer"), None);
    }

    #[test]
    fn empty_message_has_no_length() {
        let reg = Registry::default();
        let msg = Message::new(SchemaId(0), SrcPos::default());
        assert_eq!(msg.min_length(&reg), 0);
        assert_eq!(msg.max_length(&reg), 0);
        assert!(msg.find_field("x").is_none());
    }
}
