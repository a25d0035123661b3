//! `<interface>` definitions: the fields common to every message of a
//! protocol, kept outside of the message payload.

use crate::alias::{self, Alias, ALIAS};
use crate::common;
use crate::error::DslResult;
use crate::field::{self, Field, Kind, SemanticType, REUSE, REUSE_CODE};
use crate::message::{COPY_FIELDS_ALIASES, COPY_FIELDS_FROM, FIELDS, REUSE_ALIASES};
use crate::props::{self, Extra, Props};
use crate::registry::{ParseCtx, Parent, Registry, SchemaId};
use crate::schema::Feature;
use crate::version::VersionWindow;
use crate::xml::{SrcPos, XmlNode};

pub const INTERFACE: &str = "interface";
pub const INTERFACES: &str = "interfaces";

const PROP_NAMES: &[&str] = &[
    props::NAME,
    props::DESCRIPTION,
    COPY_FIELDS_FROM,
    COPY_FIELDS_ALIASES,
    REUSE,
    REUSE_CODE,
    REUSE_ALIASES,
];

#[derive(Debug, Clone)]
pub struct Interface {
    pub name: String,
    pub description: String,
    pub fields: Vec<Field>,
    pub aliases: Vec<Alias>,
    pub copy_code_from: String,
    pub extra: Extra,
    pub schema: SchemaId,
    pub pos: SrcPos,
}

impl Interface {
    fn new(schema: SchemaId, pos: SrcPos) -> Self {
        Interface {
            name: String::new(),
            description: String::new(),
            fields: Vec::new(),
            aliases: Vec::new(),
            copy_code_from: String::new(),
            extra: Extra::default(),
            schema,
            pos,
        }
    }

    pub fn create(node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<Interface> {
        let logger = ctx.logger;
        let p = Props::new(node, PROP_NAMES);
        let mut iface = Interface::new(ctx.schema, node.pos.clone());

        iface.apply_reuse(&p, ctx)?;
        match p.single(props::NAME, logger)? {
            Some(name) => iface.name = name,
            None if iface.name.is_empty() => {
                p.required(props::NAME, logger)?;
            }
            None => {}
        }
        if !common::is_valid_name(&iface.name) {
            return Err(props::structural(
                logger,
                p.pos(),
                format!("Invalid value for name property \"{}\".", iface.name),
            ));
        }
        if let Some(d) = p.single(props::DESCRIPTION, logger)? {
            iface.description = d;
        }

        let copied = iface.copy_fields(&p, ctx)?;
        let nodes = field::field_nodes(node, FIELDS, &Kind::ALL, logger)?;
        if !nodes.is_empty() {
            let fctx = ctx.nested(Parent::Interface, VersionWindow::default());
            iface.fields = field::create_members(nodes, fctx, std::mem::take(&mut iface.fields))?;
        }

        match copied {
            Some(aliases) if ctx.supports(Feature::FieldAlias) => {
                if p.bool_prop(COPY_FIELDS_ALIASES, logger)? != Some(false) {
                    iface.aliases.extend(aliases);
                }
            }
            Some(_) => {}
            None if p.has(COPY_FIELDS_ALIASES) => {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "Property \"{}\" is inapplicable without \"{}\".",
                        COPY_FIELDS_ALIASES, COPY_FIELDS_FROM
                    ),
                );
            }
            None => {}
        }
        iface.aliases = alias::update_aliases(node, &ctx, std::mem::take(&mut iface.aliases), &iface.fields)?;

        let mut known_children: Vec<&str> = Kind::names().to_vec();
        known_children.extend_from_slice(&[FIELDS, ALIAS]);
        iface.extra = p.check_unknown(&[PROP_NAMES], &known_children, logger)?;
        tracing::trace!(target: "commsdsl", name = %iface.name, fields = iface.fields.len(), "interface created");
        Ok(iface)
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
                    "Property \"{}\" is not supported for <interface> in DSL version {}, ignoring...",
                    REUSE,
                    ctx.schema_props().dsl_version
                ),
            );
            return Ok(());
        }
        let Some(other) = ctx.find_interface(&target) else {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("The interface \"{}\" hasn't been recorded yet.", target),
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

    /// Copy the fields named by `copyFieldsFrom`, returning the aliases of the
    /// source for `copyFieldsAliases`.
    fn copy_fields(&mut self, p: &Props<'_>, ctx: ParseCtx<'_>) -> DslResult<Option<Vec<Alias>>> {
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
        if let Some(other) = ctx.find_interface(&reference) {
            self.fields = other.fields.clone();
            return Ok(Some(other.aliases.clone()));
        }
        if !ctx.supports(Feature::CopyFieldsFromBundle) {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("Invalid reference to other interface \"{}\".", reference),
            ));
        }
        match ctx.find_field(&reference).and_then(|f| f.as_bundle().map(|b| (f, b))) {
            Some((f, b)) => {
                self.fields = f.members().to_vec();
                Ok(Some(b.aliases.clone()))
            }
            None => Err(props::semantic(
                logger,
                p.pos(),
                format!("Invalid reference to other interface or bundle \"{}\".", reference),
            )),
        }
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Whether one of the fields carries the protocol version.
    pub fn has_version_field(&self, reg: &Registry) -> bool {
        self.fields
            .iter()
            .any(|f| f.non_ref(reg).semantic_type() == SemanticType::Version || f.semantic_type() == SemanticType::Version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_interface() {
        let reg = Registry::default();
        let iface = Interface::new(SchemaId(0), SrcPos::default());
        assert!(!iface.has_version_field(&reg));
        assert!(iface.find_field("version").is_none());
    }
}
