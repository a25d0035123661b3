//! Namespaces and the loader filling them from `<schema>` / `<ns>` content.
//!
//! A namespace owns ids only; elements are stored in the [`Registry`] under
//! their dotted path. Declaring the same namespace twice (in one document or
//! across documents of the same schema) extends the first declaration.

use crate::common;
use crate::diag::Logger;
use crate::error::DslResult;
use crate::field::{Field, Kind};
use crate::frame::{Frame, FRAME, FRAMES};
use crate::interface::{Interface, INTERFACE, INTERFACES};
use crate::message::{Message, MESSAGE, MESSAGES};
use crate::props::{self, Extra, Props};
use crate::registry::{
    FieldId, FrameId, InterfaceId, MessageId, NamespaceId, ParseCtx, Registry, SchemaId,
};
use crate::schema::{Feature, Schema};
use crate::xml::{SrcPos, XmlNode};

pub const NS: &str = "ns";
pub const FIELDS: &str = "fields";

const PROP_NAMES: &[&str] = &[props::NAME, props::DISPLAY_NAME, props::DESCRIPTION];

/// Element names consumed as namespace content.
pub fn content_children() -> Vec<&'static str> {
    let mut names = vec![NS, FIELDS, MESSAGE, MESSAGES, FRAME, FRAMES, INTERFACE, INTERFACES];
    names.extend_from_slice(Kind::names());
    names
}

#[derive(Debug, Clone)]
pub struct Namespace {
    /// Empty for the default namespace of a schema.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub parent: Option<NamespaceId>,
    pub schema: SchemaId,
    /// Dotted path from the schema root, empty for the root itself.
    pub path: String,
    pub namespaces: Vec<NamespaceId>,
    pub fields: Vec<FieldId>,
    pub messages: Vec<MessageId>,
    pub frames: Vec<FrameId>,
    pub interfaces: Vec<InterfaceId>,
    pub extra: Extra,
    pub pos: SrcPos,
}

impl Namespace {
    pub fn root(schema: SchemaId, pos: SrcPos) -> Self {
        Namespace::child(None, schema, String::new(), String::new(), pos)
    }

    fn child(parent: Option<NamespaceId>, schema: SchemaId, name: String, path: String, pos: SrcPos) -> Self {
        Namespace {
            name,
            display_name: String::new(),
            description: String::new(),
            parent,
            schema,
            path,
            namespaces: Vec::new(),
            fields: Vec::new(),
            messages: Vec::new(),
            frames: Vec::new(),
            interfaces: Vec::new(),
            extra: Extra::default(),
            pos,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
            && self.fields.is_empty()
            && self.messages.is_empty()
            && self.frames.is_empty()
            && self.interfaces.is_empty()
    }
}

/// Fills the registry with the content of one schema.
pub struct Loader<'a> {
    pub registry: &'a mut Registry,
    pub schemas: &'a [Schema],
    pub schema: SchemaId,
    pub logger: &'a Logger,
}

impl<'a> Loader<'a> {
    fn ctx(&self) -> ParseCtx<'_> {
        ParseCtx::new(self.registry, self.schemas, self.schema, self.logger)
    }

    /// Process the children of `node` (a `<schema>` or `<ns>`) in document order.
    pub fn load_content(&mut self, ns: NamespaceId, node: &XmlNode) -> DslResult<()> {
        for child in &node.children {
            match child.name.as_str() {
                NS => self.load_namespace(ns, child)?,
                FIELDS => {
                    for f in group_members(child, Kind::names(), self.logger)? {
                        self.load_field(ns, f)?;
                    }
                }
                MESSAGE => self.load_message(ns, child)?,
                MESSAGES => {
                    for m in group_members(child, &[MESSAGE], self.logger)? {
                        self.load_message(ns, m)?;
                    }
                }
                FRAME => self.load_frame(ns, child)?,
                FRAMES => {
                    for f in group_members(child, &[FRAME], self.logger)? {
                        self.load_frame(ns, f)?;
                    }
                }
                INTERFACE => self.load_interface(ns, child)?,
                INTERFACES => {
                    for i in group_members(child, &[INTERFACE], self.logger)? {
                        self.load_interface(ns, i)?;
                    }
                }
                name if Kind::from_name(name).is_some() => self.load_field(ns, child)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn load_namespace(&mut self, parent: NamespaceId, node: &XmlNode) -> DslResult<()> {
        let logger = self.logger;
        let p = Props::new(node, PROP_NAMES);
        let name = p.single(props::NAME, logger)?.unwrap_or_default();
        if !common::is_valid_name(&name) {
            return Err(props::unexpected_value(logger, node, props::NAME, &name));
        }
        let mut display_name = p.single(props::DISPLAY_NAME, logger)?.unwrap_or_default();
        if !display_name.is_empty() && !self.ctx().supports(Feature::ElementDisplayName) {
            props::warn(
                logger,
                p.pos(),
                format!(
                    "The property \"{}\" of namespace is not supported for dslVersion={}.",
                    props::DISPLAY_NAME,
                    self.ctx().schema_props().dsl_version
                ),
            );
            display_name.clear();
        }
        let description = p.single(props::DESCRIPTION, logger)?.unwrap_or_default();
        let extra = p.check_unknown(&[PROP_NAMES], &content_children(), logger)?;

        let id = match self.registry.child_namespace(parent, &name) {
            Some(id) => {
                let ns = self.registry.namespace_mut(id);
                merge_text(&mut ns.description, description, "Description", &name, p.pos(), logger);
                merge_text(&mut ns.display_name, display_name, "Display name", &name, p.pos(), logger);
                merge_extra(&mut ns.extra, extra, p.pos(), logger);
                id
            }
            None => {
                let (schema, parent_path) = {
                    let pns = self.registry.namespace(parent);
                    (pns.schema, pns.path.clone())
                };
                let path = if parent_path.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", parent_path, name)
                };
                let mut ns = Namespace::child(Some(parent), schema, name, path, node.pos.clone());
                ns.display_name = display_name;
                ns.description = description;
                ns.extra = extra;
                self.registry.add_namespace(ns)
            }
        };
        tracing::trace!(target: "commsdsl", path = %self.registry.namespace(id).path, "namespace");
        self.load_content(id, node)
    }

    fn load_field(&mut self, ns: NamespaceId, node: &XmlNode) -> DslResult<()> {
        let field = Field::create(node, self.ctx())?;
        let ns_ref = self.registry.namespace(ns);
        if let Some(prev) = ns_ref
            .fields
            .iter()
            .map(|id| self.registry.field(*id))
            .find(|f| f.name() == field.name())
        {
            return Err(duplicate(self.logger, "Field", field.name(), &field.common.pos, &prev.common.pos));
        }
        self.registry.add_field(ns, field);
        Ok(())
    }

    fn load_message(&mut self, ns: NamespaceId, node: &XmlNode) -> DslResult<()> {
        let msg = Message::create(node, self.ctx())?;
        if let Some(prev) = self
            .registry
            .namespace(ns)
            .messages
            .iter()
            .map(|id| self.registry.message(*id))
            .find(|m| m.name == msg.name)
        {
            return Err(duplicate(self.logger, "Message", &msg.name, &msg.pos, &prev.pos));
        }
        self.registry.add_message(ns, msg);
        Ok(())
    }

    fn load_frame(&mut self, ns: NamespaceId, node: &XmlNode) -> DslResult<()> {
        let frame = Frame::create(node, self.ctx())?;
        if let Some(prev) = self
            .registry
            .namespace(ns)
            .frames
            .iter()
            .map(|id| self.registry.frame(*id))
            .find(|f| f.name == frame.name)
        {
            return Err(duplicate(self.logger, "Frame", &frame.name, &frame.pos, &prev.pos));
        }
        self.registry.add_frame(ns, frame);
        Ok(())
    }

    fn load_interface(&mut self, ns: NamespaceId, node: &XmlNode) -> DslResult<()> {
        let iface = Interface::create(node, self.ctx())?;
        if let Some(prev) = self
            .registry
            .namespace(ns)
            .interfaces
            .iter()
            .map(|id| self.registry.interface(*id))
            .find(|i| i.name == iface.name)
        {
            return Err(duplicate(self.logger, "Interface", &iface.name, &iface.pos, &prev.pos));
        }
        self.registry.add_interface(ns, iface);
        Ok(())
    }
}

fn duplicate(logger: &Logger, what: &str, name: &str, pos: &SrcPos, prev: &SrcPos) -> crate::error::DslError {
    props::structural(
        logger,
        pos,
        format!(
            "{} with name \"{}\" has been already defined at {}:{}.",
            what, name, prev.file, prev.line
        ),
    )
}

/// Children of a group element, each of which must be one of `allowed`.
fn group_members<'n>(group: &'n XmlNode, allowed: &[&str], logger: &Logger) -> DslResult<Vec<&'n XmlNode>> {
    for c in &group.children {
        if !allowed.contains(&c.name.as_str()) {
            return Err(props::structural(
                logger,
                &c.pos,
                format!("The \"{}\" element cannot contain \"{}\".", group.name, c.name),
            ));
        }
    }
    Ok(group.children.iter().collect())
}

fn merge_text(slot: &mut String, value: String, what: &str, ns: &str, pos: &SrcPos, logger: &Logger) {
    if value.is_empty() {
        return;
    }
    if slot.is_empty() {
        *slot = value;
        return;
    }
    if *slot != value {
        props::warn(
            logger,
            pos,
            format!("{} of namespace \"{}\" differs to one encountered before.", what, ns),
        );
    }
}

fn merge_extra(into: &mut Extra, extra: Extra, pos: &SrcPos, logger: &Logger) {
    for (name, value) in extra.attrs {
        match into.attrs.iter().find(|(n, _)| *n == name) {
            Some((_, prev)) if *prev != value => {
                props::warn(
                    logger,
                    pos,
                    format!("Value of attribute \"{}\" differs to one defined before.", name),
                );
            }
            Some(_) => {}
            None => into.attrs.push((name, value)),
        }
    }
    into.children.extend(extra.children);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_names_cover_fields() {
        let names = content_children();
        assert!(names.contains(&"bundle"));
        assert!(names.contains(&NS));
        assert!(!names.contains(&"payload"));
    }

    #[test]
    fn extra_attributes_merge() {
        let logger = Logger::default();
        let mut a = Extra {
            attrs: vec![("x.a".into(), "1".into())],
            children: Vec::new(),
        };
        let b = Extra {
            attrs: vec![("x.a".into(), "2".into()), ("x.b".into(), "3".into())],
            children: Vec::new(),
        };
        merge_extra(&mut a, b, &SrcPos::default(), &logger);
        assert_eq!(a.attrs.len(), 2);
        assert_eq!(a.attrs[0].1, "1");
        assert_eq!(logger.warning_count(), 1);
    }

    #[test]
    fn root_namespace_is_empty() {
        let ns = Namespace::root(SchemaId(0), SrcPos::default());
        assert!(ns.is_root());
        assert!(ns.is_empty());
        assert!(ns.path.is_empty());
    }
}
