//! Protocol: the set of schema documents, parsed first and validated as a whole.
//!
//! Documents are read by [`Protocol::parse`] / [`Protocol::parse_str`] and only
//! processed by [`Protocol::validate`], in the order they were given. Documents
//! declaring the same schema name extend that schema; a new name opens another
//! schema (when enabled). The last schema is the protocol schema.

use std::path::Path;

use crate::diag::{DiagCallback, Logger, LoggerConfig};
use crate::error::{DslError, DslResult};
use crate::field::SemanticType;
use crate::message;
use crate::namespace::{self, Loader, Namespace};
use crate::props::{self, Extra};
use crate::registry::{self, FieldId, FrameId, InterfaceId, MessageId, NamespaceId, Registry, SchemaId};
use crate::schema::{self, Feature, Schema, SchemaHeader};
use crate::xml::{self, XmlNode};

pub const SCHEMA: &str = "schema";

/// Caller policy for a [`Protocol`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Accept documents declaring more than one schema name.
    pub multiple_schemas_enabled: bool,
    pub logger: LoggerConfig,
}

#[derive(Debug)]
pub struct Protocol {
    config: ProtocolConfig,
    logger: Logger,
    docs: Vec<XmlNode>,
    schemas: Vec<Schema>,
    registry: Registry,
    current: Option<SchemaId>,
    validated: bool,
}

impl Protocol {
    pub fn new(config: ProtocolConfig) -> Self {
        Protocol::with_logger(config, Logger::new(config.logger))
    }

    /// Diagnostics go to `callback` instead of `tracing`.
    pub fn with_callback(config: ProtocolConfig, callback: DiagCallback) -> Self {
        Protocol::with_logger(config, Logger::with_callback(config.logger, callback))
    }

    pub fn with_logger(config: ProtocolConfig, logger: Logger) -> Self {
        Protocol {
            config,
            logger,
            docs: Vec::new(),
            schemas: Vec::new(),
            registry: Registry::default(),
            current: None,
            validated: false,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Read and parse one schema file.
    pub fn parse(&mut self, path: impl AsRef<Path>) -> DslResult<()> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).map_err(|e| {
            self.logger
                .error(format!("Failed to read \"{}\": {}", path.display(), e));
            DslError::Io(e)
        })?;
        self.parse_str(&src, &path.display().to_string())
    }

    /// Parse one schema document held in memory; `file` names it in diagnostics.
    pub fn parse_str(&mut self, src: &str, file: &str) -> DslResult<()> {
        if self.validated {
            self.logger.error("Parsing extra files after validation is not allowed");
            return Err(DslError::AlreadyValidated);
        }
        let doc = xml::parse_document(src, file).map_err(|e| {
            self.logger.error(e.to_string());
            e
        })?;
        tracing::debug!(target: "commsdsl", file, "document parsed");
        self.docs.push(doc);
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }

    /// Process every parsed document, then run the protocol wide checks.
    /// Running it again after success is a no-op.
    pub fn validate(&mut self) -> DslResult<()> {
        if self.validated {
            return Ok(());
        }
        if self.docs.is_empty() {
            self.logger.error("Cannot validate without any schema files");
            return Err(DslError::NoSchemas);
        }

        let docs = std::mem::take(&mut self.docs);
        for doc in &docs {
            self.validate_doc(doc)?;
        }

        for idx in 0..self.schemas.len() {
            let schema = SchemaId(idx);
            let allow_non_unique = self.schemas[idx].props.non_unique_msg_id_allowed;
            message::validate_all_messages(&self.registry, schema, allow_non_unique, &self.logger)?;
            self.validate_message_id_fields(schema)?;
        }

        if self.logger.warnings_are_fatal() {
            return Err(DslError::WarningsAsErrors(self.logger.warning_count()));
        }
        self.validated = true;
        tracing::debug!(
            target: "commsdsl",
            schemas = self.schemas.len(),
            fields = self.registry.field_ids().count(),
            messages = self.registry.message_ids().count(),
            "protocol validated"
        );
        Ok(())
    }

    fn validate_doc(&mut self, root: &XmlNode) -> DslResult<()> {
        if root.name != SCHEMA {
            return Err(props::structural(
                &self.logger,
                &root.pos,
                format!("Root element of \"{}\" is not \"{}\"", root.pos.file, SCHEMA),
            ));
        }
        let header = schema::parse_header(root, &namespace::content_children(), &self.logger)?;
        let id = self.merge_schema(header)?;
        self.current = Some(id);
        schema::parse_platforms(root, &mut self.schemas[id.0], &self.logger)?;

        let ns = self.schemas[id.0].root;
        let mut loader = Loader {
            registry: &mut self.registry,
            schemas: &self.schemas,
            schema: id,
            logger: &self.logger,
        };
        loader.load_content(ns, root)
    }

    /// Find or open the schema a document header belongs to.
    fn merge_schema(&mut self, header: SchemaHeader) -> DslResult<SchemaId> {
        let logger = &self.logger;
        let mut name = header.props.name.clone();
        if name.is_empty() {
            if let Some(cur) = self.current {
                name = self.schemas[cur.0].props.name.clone();
            }
        }
        if name.is_empty() {
            return Err(props::structural(
                logger,
                &header.pos,
                format!("First schema definition must define \"{}\" property.", props::NAME),
            ));
        }

        let Some(idx) = self.schemas.iter().position(|s| s.props.name == name) else {
            if let Some(cur) = self.current {
                if !self.schemas[cur.0].props.supports(Feature::MultiSchema) {
                    return Err(props::semantic(
                        logger,
                        &header.pos,
                        format!(
                            "Multiple schemas is not supported in the selected {}",
                            schema::DSL_VERSION
                        ),
                    ));
                }
                if !self.config.multiple_schemas_enabled {
                    return Err(props::semantic(
                        logger,
                        &header.pos,
                        "Multiple schemas support must be explicitly enabled by the code generator.",
                    ));
                }
            }
            let id = SchemaId(self.schemas.len());
            let root = self
                .registry
                .add_namespace(Namespace::root(id, header.pos.clone()));
            tracing::debug!(target: "commsdsl", schema = %name, "schema opened");
            self.schemas.push(Schema {
                props: header.props,
                raw_props: header.raw_props,
                extra: header.extra,
                platforms: Vec::new(),
                root,
                pos: header.pos,
            });
            return Ok(id);
        };

        let existing = &mut self.schemas[idx];
        for (prop, value) in &header.raw_props {
            let same = existing
                .raw_props
                .iter()
                .any(|(n, v)| n == prop && v == value);
            if !same {
                return Err(props::semantic(
                    logger,
                    &header.pos,
                    format!(
                        "Value of \"{}\" property of \"{}\" element differs from the first one.",
                        prop, SCHEMA
                    ),
                ));
            }
        }
        merge_schema_extra(&mut existing.extra, header.extra, &header.pos, logger);
        Ok(SchemaId(idx))
    }

    fn validate_message_id_fields(&self, schema: SchemaId) -> DslResult<()> {
        let count = self
            .registry
            .field_ids()
            .map(|id| self.registry.field_entry(id))
            .filter(|e| e.schema == schema && e.value.semantic_type() == SemanticType::MessageId)
            .count();
        if 1 < count {
            self.logger.error(format!(
                "Only single field with \"messageId\" as semantic type is allowed in schema {}",
                self.schemas[schema.0].name()
            ));
            return Err(DslError::Semantic(format!(
                "multiple message id fields in schema {}",
                self.schemas[schema.0].name()
            )));
        }
        Ok(())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.schemas[id.0]
    }

    pub fn schema_by_name(&self, name: &str) -> Option<SchemaId> {
        self.schemas.iter().position(|s| s.name() == name).map(SchemaId)
    }

    /// The last declared schema.
    pub fn protocol_schema(&self) -> Option<SchemaId> {
        self.schemas.len().checked_sub(1).map(SchemaId)
    }

    pub fn root_namespace(&self, schema: SchemaId) -> NamespaceId {
        self.schemas[schema.0].root
    }

    fn split_ref<'r>(&self, reference: &'r str) -> Option<(SchemaId, &'r str)> {
        let current = self.protocol_schema()?;
        registry::split_schema_ref(&self.schemas, current, reference)
    }

    /// Lookups by external reference, relative to the protocol schema unless
    /// prefixed with `@Schema.`.
    pub fn find_field(&self, reference: &str) -> Option<FieldId> {
        let (schema, path) = self.split_ref(reference)?;
        self.registry.find_field(schema, path)
    }

    pub fn find_message(&self, reference: &str) -> Option<MessageId> {
        let (schema, path) = self.split_ref(reference)?;
        self.registry.find_message(schema, path)
    }

    pub fn find_frame(&self, reference: &str) -> Option<FrameId> {
        let (schema, path) = self.split_ref(reference)?;
        self.registry.find_frame(schema, path)
    }

    pub fn find_interface(&self, reference: &str) -> Option<InterfaceId> {
        let (schema, path) = self.split_ref(reference)?;
        self.registry.find_interface(schema, path)
    }

    /// Messages of `schema` in declaration order, or sorted by id then order.
    pub fn messages(&self, schema: SchemaId, sorted: bool) -> Vec<MessageId> {
        let mut ids: Vec<MessageId> = self
            .registry
            .message_ids()
            .filter(|id| self.registry.message_entry(*id).schema == schema)
            .collect();
        if sorted {
            ids.sort_by_key(|id| {
                let m = self.registry.message(*id);
                (m.id, m.order)
            });
        }
        ids
    }
}

fn merge_schema_extra(into: &mut Extra, extra: Extra, pos: &crate::xml::SrcPos, logger: &Logger) {
    for (name, value) in extra.attrs {
        match into.attrs.iter().find(|(n, _)| *n == name) {
            None => into.attrs.push((name, value)),
            Some((_, prev)) if *prev != value => props::warn(
                logger,
                pos,
                format!(
                    "Value of \"{}\" attribubes of \"{}\" element differs from the previous one.",
                    name, SCHEMA
                ),
            ),
            Some(_) => {}
        }
    }
    into.children.extend(extra.children);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocol() -> Protocol {
        Protocol::new(ProtocolConfig::default())
    }

    #[test]
    fn validate_without_documents() {
        let mut p = protocol();
        assert!(matches!(p.validate(), Err(DslError::NoSchemas)));
    }

    #[test]
    fn parse_after_validation_is_rejected() {
        let mut p = protocol();
        p.parse_str("<schema name='P'/>", "a.xml").unwrap();
        p.validate().unwrap();
        assert!(matches!(
            p.parse_str("<schema name='P'/>", "b.xml"),
            Err(DslError::AlreadyValidated)
        ));
    }

    #[test]
    fn first_schema_needs_name() {
        let mut p = protocol();
        p.parse_str("<schema/>", "a.xml").unwrap();
        assert!(p.validate().is_err());
    }

    #[test]
    fn second_schema_requires_opt_in() {
        let mut p = protocol();
        p.parse_str("<schema name='A' dslVersion='5'/>", "a.xml").unwrap();
        p.parse_str("<schema name='B' dslVersion='5'/>", "b.xml").unwrap();
        assert!(p.validate().is_err());

        let mut p = Protocol::new(ProtocolConfig {
            multiple_schemas_enabled: true,
            ..Default::default()
        });
        p.parse_str("<schema name='A' dslVersion='5'/>", "a.xml").unwrap();
        p.parse_str("<schema name='B' dslVersion='5'/>", "b.xml").unwrap();
        p.validate().unwrap();
        assert_eq!(p.schemas().len(), 2);
        assert_eq!(p.protocol_schema(), Some(SchemaId(1)));
    }

    #[test]
    fn same_schema_documents_merge() {
        let mut p = protocol();
        p.parse_str("<schema name='P' version='2'><int name='A' type='uint8'/></schema>", "a.xml")
            .unwrap();
        p.parse_str("<schema><int name='B' type='uint8'/></schema>", "b.xml").unwrap();
        p.validate().unwrap();
        assert_eq!(p.schemas().len(), 1);
        assert!(p.find_field("A").is_some());
        assert!(p.find_field("B").is_some());
    }

    #[test]
    fn conflicting_schema_property() {
        let mut p = protocol();
        p.parse_str("<schema name='P' version='2'/>", "a.xml").unwrap();
        p.parse_str("<schema name='P' version='3'/>", "b.xml").unwrap();
        assert!(p.validate().is_err());
    }
}
