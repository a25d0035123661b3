//! Element arena shared by every schema.
//!
//! Namespaces own ids only; the elements themselves live here, addressed by
//! `(schema, dotted path)`. Cross-element links (`ref` targets, reuse sources,
//! frame fields) are ids into this arena.

use std::collections::HashMap;

use crate::common::{self, SCHEMA_REF_PREFIX, STRING_REF_PREFIX};
use crate::diag::Logger;
use crate::field::{Field, Kind};
use crate::frame::Frame;
use crate::interface::Interface;
use crate::message::Message;
use crate::namespace::Namespace;
use crate::schema::{Feature, Schema, SchemaProps};
use crate::version::VersionWindow;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);
    };
}

id_type!(SchemaId);
id_type!(NamespaceId);
id_type!(FieldId);
id_type!(MessageId);
id_type!(FrameId);
id_type!(InterfaceId);

/// An element registered under its external reference.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    pub schema: SchemaId,
    pub ns: NamespaceId,
    pub ext_ref: String,
    pub value: T,
}

#[derive(Debug, Default)]
pub struct Registry {
    namespaces: Vec<Namespace>,
    fields: Vec<Entry<Field>>,
    messages: Vec<Entry<Message>>,
    frames: Vec<Entry<Frame>>,
    interfaces: Vec<Entry<Interface>>,
    field_index: HashMap<(SchemaId, String), FieldId>,
    message_index: HashMap<(SchemaId, String), MessageId>,
    frame_index: HashMap<(SchemaId, String), FrameId>,
    interface_index: HashMap<(SchemaId, String), InterfaceId>,
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

impl Registry {
    pub fn add_namespace(&mut self, ns: Namespace) -> NamespaceId {
        let id = NamespaceId(self.namespaces.len());
        let parent = ns.parent;
        self.namespaces.push(ns);
        if let Some(p) = parent {
            self.namespaces[p.0].namespaces.push(id);
        }
        id
    }

    pub fn namespace(&self, id: NamespaceId) -> &Namespace {
        &self.namespaces[id.0]
    }

    pub fn namespace_mut(&mut self, id: NamespaceId) -> &mut Namespace {
        &mut self.namespaces[id.0]
    }

    /// Child namespace of `parent` called `name`.
    pub fn child_namespace(&self, parent: NamespaceId, name: &str) -> Option<NamespaceId> {
        self.namespace(parent)
            .namespaces
            .iter()
            .copied()
            .find(|id| self.namespace(*id).name == name)
    }

    pub fn add_field(&mut self, ns: NamespaceId, field: Field) -> FieldId {
        let schema = self.namespace(ns).schema;
        let ext_ref = join(&self.namespace(ns).path, &field.common.name);
        let id = FieldId(self.fields.len());
        self.field_index.insert((schema, ext_ref.clone()), id);
        self.fields.push(Entry {
            schema,
            ns,
            ext_ref,
            value: field,
        });
        self.namespaces[ns.0].fields.push(id);
        id
    }

    pub fn add_message(&mut self, ns: NamespaceId, msg: Message) -> MessageId {
        let schema = self.namespace(ns).schema;
        let ext_ref = join(&self.namespace(ns).path, &msg.name);
        let id = MessageId(self.messages.len());
        self.message_index.insert((schema, ext_ref.clone()), id);
        self.messages.push(Entry {
            schema,
            ns,
            ext_ref,
            value: msg,
        });
        self.namespaces[ns.0].messages.push(id);
        id
    }

    pub fn add_frame(&mut self, ns: NamespaceId, frame: Frame) -> FrameId {
        let schema = self.namespace(ns).schema;
        let ext_ref = join(&self.namespace(ns).path, &frame.name);
        let id = FrameId(self.frames.len());
        self.frame_index.insert((schema, ext_ref.clone()), id);
        self.frames.push(Entry {
            schema,
            ns,
            ext_ref,
            value: frame,
        });
        self.namespaces[ns.0].frames.push(id);
        id
    }

    pub fn add_interface(&mut self, ns: NamespaceId, iface: Interface) -> InterfaceId {
        let schema = self.namespace(ns).schema;
        let ext_ref = join(&self.namespace(ns).path, &iface.name);
        let id = InterfaceId(self.interfaces.len());
        self.interface_index.insert((schema, ext_ref.clone()), id);
        self.interfaces.push(Entry {
            schema,
            ns,
            ext_ref,
            value: iface,
        });
        self.namespaces[ns.0].interfaces.push(id);
        id
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.0].value
    }

    pub fn field_entry(&self, id: FieldId) -> &Entry<Field> {
        &self.fields[id.0]
    }

    pub fn message(&self, id: MessageId) -> &Message {
        &self.messages[id.0].value
    }

    pub fn message_entry(&self, id: MessageId) -> &Entry<Message> {
        &self.messages[id.0]
    }

    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0].value
    }

    pub fn frame_entry(&self, id: FrameId) -> &Entry<Frame> {
        &self.frames[id.0]
    }

    pub fn interface(&self, id: InterfaceId) -> &Interface {
        &self.interfaces[id.0].value
    }

    pub fn interface_entry(&self, id: InterfaceId) -> &Entry<Interface> {
        &self.interfaces[id.0]
    }

    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> {
        (0..self.fields.len()).map(FieldId)
    }

    pub fn message_ids(&self) -> impl Iterator<Item = MessageId> {
        (0..self.messages.len()).map(MessageId)
    }

    pub fn interface_ids(&self) -> impl Iterator<Item = InterfaceId> {
        (0..self.interfaces.len()).map(InterfaceId)
    }

    pub fn frame_ids(&self) -> impl Iterator<Item = FrameId> {
        (0..self.frames.len()).map(FrameId)
    }

    /// Interfaces declared anywhere in `schema`.
    pub fn interfaces_in(&self, schema: SchemaId) -> impl Iterator<Item = &Interface> {
        self.interfaces
            .iter()
            .filter(move |e| e.schema == schema)
            .map(|e| &e.value)
    }

    pub fn find_field(&self, schema: SchemaId, path: &str) -> Option<FieldId> {
        self.field_index.get(&(schema, path.to_string())).copied()
    }

    pub fn find_message(&self, schema: SchemaId, path: &str) -> Option<MessageId> {
        self.message_index.get(&(schema, path.to_string())).copied()
    }

    pub fn find_frame(&self, schema: SchemaId, path: &str) -> Option<FrameId> {
        self.frame_index.get(&(schema, path.to_string())).copied()
    }

    pub fn find_interface(&self, schema: SchemaId, path: &str) -> Option<InterfaceId> {
        self.interface_index.get(&(schema, path.to_string())).copied()
    }

    /// Walk `path` from `root` through namespaces until a field name matches;
    /// returns the field and the unconsumed rest of the path.
    pub fn resolve_value<'a, 'p>(
        &'a self,
        root: NamespaceId,
        path: &'p str,
    ) -> Option<(&'a Field, &'p str)> {
        let mut ns = root;
        let mut rest = path;
        loop {
            let (first, tail) = common::split_first(rest);
            if !tail.is_empty() {
                if let Some(child) = self.child_namespace(ns, first) {
                    ns = child;
                    rest = tail;
                    continue;
                }
            }
            let field = self
                .namespace(ns)
                .fields
                .iter()
                .map(|id| self.field(*id))
                .find(|f| f.common.name == first)?;
            return Some((field, tail));
        }
    }
}

/// Kind of element that owns the one being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Namespace,
    Field(Kind),
    Message,
    Interface,
    Layer,
}

/// Read-only view passed down while an element is being created.
#[derive(Debug, Clone, Copy)]
pub struct ParseCtx<'a> {
    pub registry: &'a Registry,
    pub schemas: &'a [Schema],
    pub schema: SchemaId,
    pub logger: &'a Logger,
    pub parent: Parent,
    pub window: VersionWindow,
}

impl<'a> ParseCtx<'a> {
    pub fn new(
        registry: &'a Registry,
        schemas: &'a [Schema],
        schema: SchemaId,
        logger: &'a Logger,
    ) -> Self {
        ParseCtx {
            registry,
            schemas,
            schema,
            logger,
            parent: Parent::Namespace,
            window: VersionWindow::default(),
        }
    }

    /// Context for members of the element being parsed.
    pub fn nested(self, parent: Parent, window: VersionWindow) -> Self {
        ParseCtx {
            parent,
            window,
            ..self
        }
    }

    pub fn schema_props(&self) -> &'a SchemaProps {
        &self.schemas[self.schema.0].props
    }

    pub fn current_schema(&self) -> &'a Schema {
        &self.schemas[self.schema.0]
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.schema_props().supports(feature)
    }

    /// Value of `Enum.Value`, independent of the field value reference gate.
    pub fn str_to_enum_value(&self, reference: &str) -> Option<i128> {
        let (field_ref, value) = common::split_last(reference)?;
        let field = self.find_field(field_ref)?;
        field.as_enum()?.values.get(value).map(|v| v.value)
    }

    /// Split an optional `@Schema.` prefix off a reference. `None` when the named
    /// schema does not exist.
    pub fn split_schema<'r>(&self, reference: &'r str) -> Option<(SchemaId, &'r str)> {
        split_schema_ref(self.schemas, self.schema, reference)
    }

    pub fn find_field_id(&self, reference: &str) -> Option<FieldId> {
        let (schema, path) = self.split_schema(reference)?;
        self.registry.find_field(schema, path)
    }

    pub fn find_field(&self, reference: &str) -> Option<&'a Field> {
        self.find_field_id(reference).map(|id| self.registry.field(id))
    }

    pub fn find_message(&self, reference: &str) -> Option<&'a Message> {
        let (schema, path) = self.split_schema(reference)?;
        self.registry
            .find_message(schema, path)
            .map(|id| self.registry.message(id))
    }

    pub fn find_interface(&self, reference: &str) -> Option<&'a Interface> {
        let (schema, path) = self.split_schema(reference)?;
        self.registry
            .find_interface(schema, path)
            .map(|id| self.registry.interface(id))
    }

    fn value_field<'r>(&self, reference: &'r str) -> Option<(&'a Field, &'r str)> {
        if !self.supports(Feature::FieldValueReference) {
            return None;
        }
        let (schema, path) = self.split_schema(reference)?;
        let root = self.schemas[schema.0].root;
        self.registry.resolve_value(root, path)
    }

    /// Numeric value designated by a reference such as `ns.Field.special`.
    pub fn str_to_numeric(&self, reference: &str) -> Option<i128> {
        let (field, rest) = self.value_field(reference)?;
        field.str_to_numeric(rest, self.registry)
    }

    pub fn str_to_bool(&self, reference: &str) -> Option<bool> {
        let (field, rest) = self.value_field(reference)?;
        field.str_to_bool(rest, self.registry)
    }

    pub fn str_to_string(&self, reference: &str) -> Option<String> {
        let (field, rest) = self.value_field(reference)?;
        field.str_to_string(rest, self.registry)
    }

    pub fn str_to_data(&self, reference: &str) -> Option<Vec<u8>> {
        let (field, rest) = self.value_field(reference)?;
        field.str_to_data(rest, self.registry)
    }

    /// Text property value: `^ref` pulls the value of a string field, a `^`
    /// escaped with backslashes is kept literally minus one backslash.
    pub fn str_to_string_value(&self, value: &str) -> Option<String> {
        if value.is_empty() || !self.supports(Feature::FieldValueReference) {
            return Some(value.to_string());
        }
        if let Some(reference) = value.strip_prefix(STRING_REF_PREFIX) {
            return self.str_to_string(reference);
        }
        let escaped = value
            .find(STRING_REF_PREFIX)
            .map(|pos| 0 < pos && value[..pos].chars().all(|c| c == '\\'))
            .unwrap_or(false);
        if escaped {
            return Some(value[1..].to_string());
        }
        Some(value.to_string())
    }
}

pub(crate) fn split_schema_ref<'r>(
    schemas: &[Schema],
    current: SchemaId,
    reference: &'r str,
) -> Option<(SchemaId, &'r str)> {
    let Some(rest) = reference.strip_prefix(SCHEMA_REF_PREFIX) else {
        return Some((current, reference));
    };
    let (name, path) = common::split_first(rest);
    let pos = schemas.iter().position(|s| s.props.name == name)?;
    Some((SchemaId(pos), path))
}
