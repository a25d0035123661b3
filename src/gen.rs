//! Generator semantic tree: the validated protocol as code generators see it.
//!
//! Every element of the protocol gets a wrapper tracking its lifecycle:
//!
//! - **Created**: built for every element right after validation.
//! - **Skipped**: not referenced when the prepare pass ran.
//! - **Prepared**: referenced and successfully prepared (dependencies first).
//! - **Written**: handed to a [`Visitor`] by [`Generator::write`].
//!
//! By default every interface and message is referenced, and through them the
//! fields they depend on. Elements nothing refers to are prepared on first
//! access through the `find_*` lookups; a failing lazy prepare reads as "not
//! found".

use std::cell::{Cell, OnceCell};
use std::path::Path;

use crate::diag::{LoggerConfig, Severity};
use crate::error::{DslError, DslResult};
use crate::field::{Field, FieldLink, InnerField, SemanticType};
use crate::frame::Frame;
use crate::interface::Interface;
use crate::layer::{Layer, LayerKind};
use crate::message::Message;
use crate::namespace::Namespace;
use crate::protocol::{Protocol, ProtocolConfig};
use crate::registry::{FieldId, FrameId, InterfaceId, MessageId, NamespaceId, Registry, SchemaId};
use crate::schema::Schema;
use crate::version::{self, VersionWindow};

/// Name of the interface synthesized for schemas that define none.
pub const DEFAULT_INTERFACE_NAME: &str = "Message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenConfig {
    /// Oldest protocol version the generated code must still talk to.
    pub min_remote_version: u32,
    pub all_interfaces_referenced: bool,
    pub all_messages_referenced: bool,
    pub multiple_schemas_enabled: bool,
    pub warn_as_err: bool,
    pub min_level: Severity,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            min_remote_version: 0,
            all_interfaces_referenced: true,
            all_messages_referenced: true,
            multiple_schemas_enabled: false,
            warn_as_err: false,
            min_level: Severity::Info,
        }
    }
}

impl GenConfig {
    pub fn protocol_config(&self) -> ProtocolConfig {
        ProtocolConfig {
            multiple_schemas_enabled: self.multiple_schemas_enabled,
            logger: LoggerConfig {
                min_level: self.min_level,
                warn_as_err: self.warn_as_err,
            },
        }
    }
}

/// Parse and validate `files` under the policy of `config`.
pub fn load_protocol<P: AsRef<Path>>(files: &[P], config: &GenConfig) -> DslResult<Protocol> {
    let mut protocol = Protocol::new(config.protocol_config());
    for f in files {
        protocol.logger().info(format!("Parsing {}", f.as_ref().display()));
        protocol.parse(f)?;
    }
    protocol.validate()?;
    Ok(protocol)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenState {
    Created,
    Skipped,
    Prepared,
    Written,
}

/// Lifecycle flags shared by every element wrapper.
#[derive(Debug, Default)]
struct Lifecycle {
    referenced: Cell<bool>,
    preparing: Cell<bool>,
    skipped: Cell<bool>,
    prepared: OnceCell<bool>,
    written: Cell<bool>,
}

impl Lifecycle {
    fn state(&self) -> GenState {
        if self.written.get() {
            return GenState::Written;
        }
        match self.prepared.get() {
            Some(true) => GenState::Prepared,
            _ if self.skipped.get() => GenState::Skipped,
            _ => GenState::Created,
        }
    }

    fn is_prepared(&self) -> bool {
        self.prepared.get() == Some(&true)
    }

    /// Run `f` once; a re-entrant call (dependency cycle) fails.
    fn prepare(&self, f: impl FnOnce() -> bool) -> bool {
        if let Some(done) = self.prepared.get() {
            return *done;
        }
        if self.preparing.replace(true) {
            return false;
        }
        let ok = *self.prepared.get_or_init(f);
        self.preparing.set(false);
        if ok {
            self.skipped.set(false);
        }
        ok
    }

    /// Mark referenced; false when it already was.
    fn reference(&self) -> bool {
        !self.referenced.replace(true)
    }
}

/// A field, with the fields it owns.
#[derive(Debug)]
pub struct GenField<'p> {
    field: &'p Field,
    ext_ref: String,
    members: Vec<GenField<'p>>,
    external: Vec<FieldId>,
    forced_pseudo: Cell<bool>,
    forced_fail_on_invalid: Cell<bool>,
    life: Lifecycle,
}

impl<'p> GenField<'p> {
    fn new(field: &'p Field, ext_ref: String) -> Self {
        let mut members = Vec::new();
        let mut external = Vec::new();
        for link in field.links() {
            match link {
                FieldLink::Owned(f) => members.push(GenField::new(f, String::new())),
                FieldLink::External(id) => external.push(id),
            }
        }
        GenField {
            field,
            ext_ref,
            members,
            external,
            forced_pseudo: Cell::new(false),
            forced_fail_on_invalid: Cell::new(false),
            life: Lifecycle::default(),
        }
    }

    pub fn field(&self) -> &'p Field {
        self.field
    }

    pub fn name(&self) -> &'p str {
        self.field.name()
    }

    /// Empty for fields owned by another element.
    pub fn ext_ref(&self) -> &str {
        &self.ext_ref
    }

    /// Owned member and inner fields.
    pub fn members(&self) -> &[GenField<'p>] {
        &self.members
    }

    pub fn state(&self) -> GenState {
        self.life.state()
    }

    pub fn is_referenced(&self) -> bool {
        self.life.referenced.get()
    }

    pub fn is_prepared(&self) -> bool {
        self.life.is_prepared()
    }

    pub fn is_pseudo(&self) -> bool {
        self.forced_pseudo.get() || self.field.is_pseudo()
    }

    pub fn fails_on_invalid(&self) -> bool {
        self.forced_fail_on_invalid.get() || self.field.common.fail_on_invalid
    }

    pub fn is_forced_pseudo(&self) -> bool {
        self.forced_pseudo.get()
    }

    pub fn is_forced_fail_on_invalid(&self) -> bool {
        self.forced_fail_on_invalid.get()
    }

    pub fn set_forced_pseudo(&self) {
        self.forced_pseudo.set(true);
        for m in &self.members {
            m.set_forced_pseudo();
        }
    }

    pub fn set_forced_fail_on_invalid(&self) {
        self.forced_fail_on_invalid.set(true);
        for m in &self.members {
            m.set_forced_fail_on_invalid();
        }
    }
}

#[derive(Debug)]
pub struct GenMessage<'p> {
    id: MessageId,
    message: &'p Message,
    fields: Vec<GenField<'p>>,
    life: Lifecycle,
}

impl<'p> GenMessage<'p> {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn message(&self) -> &'p Message {
        self.message
    }

    pub fn fields(&self) -> &[GenField<'p>] {
        &self.fields
    }

    pub fn state(&self) -> GenState {
        self.life.state()
    }

    pub fn is_referenced(&self) -> bool {
        self.life.referenced.get()
    }
}

/// A defined interface, or the default one of a schema without any.
#[derive(Debug)]
pub struct GenInterface<'p> {
    id: Option<InterfaceId>,
    interface: Option<&'p Interface>,
    fields: Vec<GenField<'p>>,
    life: Lifecycle,
}

impl<'p> GenInterface<'p> {
    pub fn id(&self) -> Option<InterfaceId> {
        self.id
    }

    pub fn interface(&self) -> Option<&'p Interface> {
        self.interface
    }

    pub fn name(&self) -> &'p str {
        self.interface
            .map(|i| i.name.as_str())
            .unwrap_or(DEFAULT_INTERFACE_NAME)
    }

    pub fn is_default(&self) -> bool {
        self.interface.is_none()
    }

    pub fn fields(&self) -> &[GenField<'p>] {
        &self.fields
    }

    pub fn state(&self) -> GenState {
        self.life.state()
    }
}

#[derive(Debug)]
pub struct GenLayer<'p> {
    layer: &'p Layer,
    field: Option<GenField<'p>>,
    /// Field referenced through `field="..."`.
    external: Option<FieldId>,
}

impl<'p> GenLayer<'p> {
    fn new(layer: &'p Layer, reg: &'p Registry) -> Self {
        let external = match &layer.field {
            InnerField::External(id) => Some(*id),
            _ => None,
        };
        let ext_ref = external
            .map(|id| reg.field_entry(id).ext_ref.clone())
            .unwrap_or_default();
        let field = layer.field(reg).map(|f| GenField::new(f, ext_ref));
        if let Some(f) = &field {
            match layer.as_value() {
                Some(v) if v.pseudo => f.set_forced_pseudo(),
                _ => {}
            }
            if layer.kind() == LayerKind::Sync {
                f.set_forced_fail_on_invalid();
            }
        }
        GenLayer {
            layer,
            field,
            external,
        }
    }

    pub fn layer(&self) -> &'p Layer {
        self.layer
    }

    pub fn field(&self) -> Option<&GenField<'p>> {
        self.field.as_ref()
    }
}

#[derive(Debug)]
pub struct GenFrame<'p> {
    id: FrameId,
    frame: &'p Frame,
    layers: Vec<GenLayer<'p>>,
    order: OnceCell<Vec<usize>>,
    life: Lifecycle,
}

impl<'p> GenFrame<'p> {
    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn frame(&self) -> &'p Frame {
        self.frame
    }

    /// Layers in declared order.
    pub fn layers(&self) -> &[GenLayer<'p>] {
        &self.layers
    }

    /// Layers in processing order, available once prepared.
    pub fn ordered_layers(&self) -> Option<Vec<&GenLayer<'p>>> {
        let order = self.order.get()?;
        Some(order.iter().map(|i| &self.layers[*i]).collect())
    }

    pub fn state(&self) -> GenState {
        self.life.state()
    }
}

/// Per-schema data derived while preparing.
#[derive(Debug)]
pub struct GenSchema<'p> {
    id: SchemaId,
    schema: &'p Schema,
    min_remote_version: u32,
    version_dependent: bool,
    default_interface: Option<GenInterface<'p>>,
}

impl<'p> GenSchema<'p> {
    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn schema(&self) -> &'p Schema {
        self.schema
    }

    pub fn name(&self) -> &'p str {
        self.schema.name()
    }

    /// Top level namespace of generated code.
    pub fn main_namespace(&self) -> &'p str {
        self.schema.name()
    }

    pub fn version(&self) -> u32 {
        self.schema.props.version
    }

    pub fn min_remote_version(&self) -> u32 {
        self.min_remote_version
    }

    /// Some interface carries the protocol version.
    pub fn version_dependent_code(&self) -> bool {
        self.version_dependent
    }

    pub fn default_interface(&self) -> Option<&GenInterface<'p>> {
        self.default_interface.as_ref()
    }

    /// Present in generated code: introduced by the current version and not
    /// removed for any remote still supported.
    pub fn does_element_exist(&self, window: VersionWindow) -> bool {
        if self.version() < window.since {
            return false;
        }
        !window.removed || self.min_remote_version < window.deprecated
    }

    pub fn is_element_optional(&self, window: VersionWindow) -> bool {
        version::is_element_optional(window.since, window.deprecated, window.removed, self.min_remote_version)
    }

    pub fn is_element_deprecated(&self, window: VersionWindow) -> bool {
        window.deprecated < self.version()
    }
}

/// Receives prepared elements from [`Generator::write`], containers first
/// opening then their content.
pub trait Visitor<'p> {
    fn schema(&mut self, _schema: &GenSchema<'p>) -> DslResult<()> {
        Ok(())
    }
    fn enter_namespace(&mut self, _ns: &'p Namespace) -> DslResult<()> {
        Ok(())
    }
    fn leave_namespace(&mut self, _ns: &'p Namespace) -> DslResult<()> {
        Ok(())
    }
    fn field(&mut self, _field: &GenField<'p>) -> DslResult<()> {
        Ok(())
    }
    fn interface(&mut self, _iface: &GenInterface<'p>) -> DslResult<()> {
        Ok(())
    }
    fn message(&mut self, _msg: &GenMessage<'p>) -> DslResult<()> {
        Ok(())
    }
    fn frame(&mut self, _frame: &GenFrame<'p>) -> DslResult<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct Generator<'p> {
    protocol: &'p Protocol,
    config: GenConfig,
    schemas: Vec<GenSchema<'p>>,
    /// Indexed like the registry ids.
    fields: Vec<GenField<'p>>,
    messages: Vec<GenMessage<'p>>,
    interfaces: Vec<GenInterface<'p>>,
    frames: Vec<GenFrame<'p>>,
}

impl<'p> Generator<'p> {
    /// Create the tree for a validated protocol and prepare what is referenced.
    pub fn prepare(protocol: &'p Protocol, config: GenConfig) -> DslResult<Self> {
        let logger = protocol.logger();
        if !protocol.is_validated() {
            logger.error("Protocol must be validated before generation");
            return Err(DslError::Semantic("protocol is not validated".into()));
        }
        if protocol.schemas().is_empty() {
            logger.error("No schemas available");
            return Err(DslError::NoSchemas);
        }

        let mut gen = Generator::create(protocol, config);
        gen.check_min_remote_version()?;
        gen.add_default_interfaces();

        for idx in 0..gen.schemas.len() {
            let id = SchemaId(idx);
            if config.all_interfaces_referenced {
                for iface in gen.schema_interfaces(id) {
                    gen.reference_interface(iface);
                }
            }
            if config.all_messages_referenced {
                for m in gen.messages.iter().filter(|m| gen.message_schema(m) == id) {
                    gen.reference_message(m);
                }
                for f in gen.frames.iter().filter(|f| gen.reg().frame_entry(f.id).schema == id) {
                    gen.reference_frame(f);
                }
            }
        }

        for idx in 0..gen.schemas.len() {
            let schema = &gen.schemas[idx];
            if !gen.prepare_namespace(schema.schema.root) {
                logger.error(format!(
                    "Failed to prepare elements inside schema \"{}\"",
                    schema.name()
                ));
                return Err(DslError::Semantic(format!(
                    "failed to prepare schema \"{}\"",
                    schema.name()
                )));
            }
            if let Some(iface) = &schema.default_interface {
                gen.prepare_interface(iface);
            }
        }

        if logger.warnings_are_fatal() {
            logger.error("Warning treated as error");
            return Err(DslError::WarningsAsErrors(logger.warning_count()));
        }
        tracing::debug!(target: "commsdsl", schemas = gen.schemas.len(), "generator tree prepared");
        Ok(gen)
    }

    fn create(protocol: &'p Protocol, config: GenConfig) -> Self {
        let reg = protocol.registry();
        let fields = reg
            .field_ids()
            .map(|id| {
                let e = reg.field_entry(id);
                GenField::new(&e.value, e.ext_ref.clone())
            })
            .collect();
        let messages = reg
            .message_ids()
            .map(|id| {
                let message = reg.message(id);
                GenMessage {
                    id,
                    message,
                    fields: message.fields.iter().map(|f| GenField::new(f, String::new())).collect(),
                    life: Lifecycle::default(),
                }
            })
            .collect();
        let interfaces = reg
            .interface_ids()
            .map(|id| {
                let iface = reg.interface(id);
                GenInterface {
                    id: Some(id),
                    interface: Some(iface),
                    fields: iface.fields.iter().map(|f| GenField::new(f, String::new())).collect(),
                    life: Lifecycle::default(),
                }
            })
            .collect();
        let frames = reg
            .frame_ids()
            .map(|id| {
                let frame = reg.frame(id);
                GenFrame {
                    id,
                    frame,
                    layers: frame.layers.iter().map(|l| GenLayer::new(l, reg)).collect(),
                    order: OnceCell::new(),
                    life: Lifecycle::default(),
                }
            })
            .collect();

        let last = protocol.schemas().len().saturating_sub(1);
        let schemas = protocol
            .schemas()
            .iter()
            .enumerate()
            .map(|(idx, schema)| GenSchema {
                id: SchemaId(idx),
                schema,
                min_remote_version: if idx == last { config.min_remote_version } else { 0 },
                version_dependent: reg
                    .interfaces_in(SchemaId(idx))
                    .any(|i| i.has_version_field(reg)),
                default_interface: None,
            })
            .collect();

        Generator {
            protocol,
            config,
            schemas,
            fields,
            messages,
            interfaces,
            frames,
        }
    }

    fn check_min_remote_version(&self) -> DslResult<()> {
        let Some(schema) = self.schemas.last() else {
            return Ok(());
        };
        if schema.version() < schema.min_remote_version {
            self.logger().error(format!(
                "Minimal remote version ({}) is greater than the schema version ({}).",
                schema.min_remote_version,
                schema.version()
            ));
            return Err(DslError::Semantic("invalid minimal remote version".into()));
        }
        Ok(())
    }

    /// A schema with messages or frames but no interface gets an empty one.
    fn add_default_interfaces(&mut self) {
        let protocol = self.protocol;
        let reg = protocol.registry();
        for schema in &mut self.schemas {
            let id = schema.id;
            let has_interface = reg.interfaces_in(id).next().is_some();
            let needs_one = reg.message_ids().any(|m| reg.message_entry(m).schema == id)
                || reg.frame_ids().any(|f| reg.frame_entry(f).schema == id);
            if has_interface || !needs_one {
                continue;
            }
            tracing::debug!(target: "commsdsl", schema = %schema.name(), "default interface added");
            let iface = GenInterface {
                id: None,
                interface: None,
                fields: Vec::new(),
                life: Lifecycle::default(),
            };
            iface.life.reference();
            schema.default_interface = Some(iface);
        }
    }

    fn reg(&self) -> &'p Registry {
        self.protocol.registry()
    }

    fn logger(&self) -> &'p crate::diag::Logger {
        self.protocol.logger()
    }

    fn message_schema(&self, m: &GenMessage<'p>) -> SchemaId {
        self.reg().message_entry(m.id).schema
    }

    fn schema_interfaces(&self, id: SchemaId) -> impl Iterator<Item = &GenInterface<'p>> + '_ {
        self.interfaces
            .iter()
            .filter(move |i| i.id.map(|x| self.reg().interface_entry(x).schema) == Some(id))
    }

    pub fn protocol(&self) -> &'p Protocol {
        self.protocol
    }

    pub fn config(&self) -> &GenConfig {
        &self.config
    }

    pub fn schemas(&self) -> &[GenSchema<'p>] {
        &self.schemas
    }

    /// The last schema, the one describing the protocol itself.
    pub fn protocol_schema(&self) -> Option<&GenSchema<'p>> {
        self.schemas.last()
    }

    pub fn schema(&self, id: SchemaId) -> &GenSchema<'p> {
        &self.schemas[id.0]
    }

    // ==================== referencing ====================

    fn reference_field(&self, f: &GenField<'p>) {
        if !f.life.reference() {
            return;
        }
        for m in &f.members {
            self.reference_field(m);
        }
        for id in &f.external {
            self.reference_field(&self.fields[id.0]);
        }
    }

    fn reference_message(&self, m: &GenMessage<'p>) {
        if m.life.reference() {
            for f in &m.fields {
                self.reference_field(f);
            }
        }
    }

    fn reference_interface(&self, i: &GenInterface<'p>) {
        if i.life.reference() {
            for f in &i.fields {
                self.reference_field(f);
            }
        }
    }

    fn reference_frame(&self, f: &GenFrame<'p>) {
        if f.life.reference() {
            for l in &f.layers {
                if let Some(field) = &l.field {
                    self.reference_field(field);
                }
                if let Some(id) = l.external {
                    self.reference_field(&self.fields[id.0]);
                }
            }
        }
    }

    // ==================== prepare ====================

    fn prepare_field(&self, f: &GenField<'p>) -> bool {
        f.life.prepare(|| {
            let members_ok = f.members.iter().all(|m| {
                self.reference_field(m);
                self.prepare_field(m)
            });
            let external_ok = f.external.iter().all(|id| {
                let target = &self.fields[id.0];
                self.reference_field(target);
                self.prepare_field(target)
            });
            if let Some(r) = f.field.as_ref() {
                if r.target.is_none() {
                    self.logger().error(format!(
                        "{}Reference field \"{}\" does not point to any field.",
                        f.field.common.pos,
                        f.name()
                    ));
                    return false;
                }
            }
            members_ok && external_ok
        })
    }

    fn prepare_message(&self, m: &GenMessage<'p>) -> bool {
        m.life.prepare(|| m.fields.iter().all(|f| self.prepare_field(f)))
    }

    fn prepare_interface(&self, i: &GenInterface<'p>) -> bool {
        i.life.prepare(|| i.fields.iter().all(|f| self.prepare_field(f)))
    }

    fn prepare_frame(&self, f: &GenFrame<'p>) -> bool {
        f.life.prepare(|| {
            let fields_ok = f.layers.iter().all(|l| {
                let own = l.field.as_ref().map_or(true, |field| {
                    self.reference_field(field);
                    self.prepare_field(field)
                });
                let external = l.external.map_or(true, |id| {
                    let target = &self.fields[id.0];
                    self.reference_field(target);
                    self.prepare_field(target)
                });
                own && external
            });
            if !fields_ok {
                return false;
            }
            match f.frame.processing_order(self.logger()) {
                Ok(order) => f.order.set(order).is_ok(),
                Err(_) => false,
            }
        })
    }

    /// Sub-namespaces first, then the namespace's own elements. Unreferenced
    /// elements are left for lazy preparation.
    fn prepare_namespace(&self, id: NamespaceId) -> bool {
        let ns = self.reg().namespace(id);
        if !ns.namespaces.iter().all(|c| self.prepare_namespace(*c)) {
            return false;
        }
        let run = |life: &Lifecycle, prepare: &dyn Fn() -> bool| {
            if !life.referenced.get() {
                life.skipped.set(true);
                return true;
            }
            prepare()
        };
        ns.fields.iter().all(|fid| {
            let f = &self.fields[fid.0];
            run(&f.life, &|| self.prepare_field(f))
        }) && ns.interfaces.iter().all(|iid| {
            let i = &self.interfaces[iid.0];
            run(&i.life, &|| self.prepare_interface(i))
        }) && ns.messages.iter().all(|mid| {
            let m = &self.messages[mid.0];
            run(&m.life, &|| self.prepare_message(m))
        }) && ns.frames.iter().all(|fid| {
            let f = &self.frames[fid.0];
            run(&f.life, &|| self.prepare_frame(f))
        })
    }

    // ==================== lookups ====================

    /// Field by external reference, relative to the protocol schema unless
    /// prefixed with `@Schema.`; prepared on first access.
    pub fn find_field(&self, reference: &str) -> Option<&GenField<'p>> {
        let f = &self.fields[self.protocol.find_field(reference)?.0];
        self.reference_field(f);
        if self.prepare_field(f) {
            return Some(f);
        }
        self.logger().warning(format!("Failed to prepare field: {}", f.ext_ref));
        None
    }

    pub fn find_message(&self, reference: &str) -> Option<&GenMessage<'p>> {
        let m = &self.messages[self.protocol.find_message(reference)?.0];
        self.reference_message(m);
        if self.prepare_message(m) {
            return Some(m);
        }
        self.logger().warning(format!(
            "Failed to prepare message: {}",
            self.reg().message_entry(m.id).ext_ref
        ));
        None
    }

    pub fn find_frame(&self, reference: &str) -> Option<&GenFrame<'p>> {
        let f = &self.frames[self.protocol.find_frame(reference)?.0];
        self.reference_frame(f);
        if self.prepare_frame(f) {
            return Some(f);
        }
        self.logger().warning(format!(
            "Failed to prepare frame: {}",
            self.reg().frame_entry(f.id).ext_ref
        ));
        None
    }

    /// An empty reference selects the protocol schema's default interface.
    pub fn find_interface(&self, reference: &str) -> Option<&GenInterface<'p>> {
        if reference.is_empty() {
            return self.protocol_schema()?.default_interface.as_ref();
        }
        let i = &self.interfaces[self.protocol.find_interface(reference)?.0];
        self.reference_interface(i);
        if self.prepare_interface(i) {
            return Some(i);
        }
        self.logger().warning(format!("Failed to prepare interface: {}", i.name()));
        None
    }

    pub fn field(&self, id: FieldId) -> &GenField<'p> {
        &self.fields[id.0]
    }

    pub fn message(&self, id: MessageId) -> &GenMessage<'p> {
        &self.messages[id.0]
    }

    pub fn frame(&self, id: FrameId) -> &GenFrame<'p> {
        &self.frames[id.0]
    }

    pub fn interface(&self, id: InterfaceId) -> &GenInterface<'p> {
        &self.interfaces[id.0]
    }

    /// Interfaces of a schema, the default one when none is defined.
    pub fn interfaces_of(&self, schema: SchemaId) -> Vec<&GenInterface<'p>> {
        let mut out: Vec<&GenInterface<'p>> = self.schema_interfaces(schema).collect();
        out.extend(self.schemas[schema.0].default_interface.as_ref());
        out
    }

    /// Messages of a schema, optionally sorted by id then order.
    pub fn messages_of(&self, schema: SchemaId, sorted: bool) -> Vec<&GenMessage<'p>> {
        self.protocol
            .messages(schema, sorted)
            .into_iter()
            .map(|id| &self.messages[id.0])
            .collect()
    }

    pub fn frames_of(&self, schema: SchemaId) -> Vec<&GenFrame<'p>> {
        self.frames
            .iter()
            .filter(|f| self.reg().frame_entry(f.id).schema == schema)
            .collect()
    }

    /// Prepared top level fields with the `messageId` semantic type.
    pub fn message_id_fields(&self, schema: SchemaId) -> Vec<&GenField<'p>> {
        self.fields
            .iter()
            .zip(self.reg().field_ids())
            .filter(|(f, id)| {
                self.reg().field_entry(*id).schema == schema
                    && f.is_prepared()
                    && f.field.semantic_type() == SemanticType::MessageId
            })
            .map(|(f, _)| f)
            .collect()
    }

    pub fn has_any_referenced_message(&self, schema: SchemaId) -> bool {
        self.messages
            .iter()
            .any(|m| m.is_referenced() && self.message_schema(m) == schema)
    }

    // ==================== write ====================

    /// Hand every prepared element to `visitor`, schema by schema in
    /// preparation order. Unreferenced elements are not visited.
    pub fn write(&self, visitor: &mut dyn Visitor<'p>) -> DslResult<()> {
        for schema in &self.schemas {
            visitor.schema(schema)?;
            self.write_namespace(schema.schema.root, visitor)?;
            if let Some(iface) = &schema.default_interface {
                if iface.life.is_prepared() {
                    visitor.interface(iface)?;
                    iface.life.written.set(true);
                }
            }
        }
        Ok(())
    }

    fn write_namespace(&self, id: NamespaceId, visitor: &mut dyn Visitor<'p>) -> DslResult<()> {
        let reg = self.reg();
        let ns = reg.namespace(id);
        visitor.enter_namespace(ns)?;
        for c in &ns.namespaces {
            self.write_namespace(*c, visitor)?;
        }
        for fid in &ns.fields {
            let f = &self.fields[fid.0];
            if f.life.is_prepared() {
                visitor.field(f)?;
                f.life.written.set(true);
            }
        }
        for iid in &ns.interfaces {
            let i = &self.interfaces[iid.0];
            if i.life.is_prepared() {
                visitor.interface(i)?;
                i.life.written.set(true);
            }
        }
        for mid in &ns.messages {
            let m = &self.messages[mid.0];
            if m.life.is_prepared() {
                visitor.message(m)?;
                m.life.written.set(true);
            }
        }
        for fid in &ns.frames {
            let f = &self.frames[fid.0];
            if f.life.is_prepared() {
                visitor.frame(f)?;
                f.life.written.set(true);
            }
        }
        visitor.leave_namespace(ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_states() {
        let life = Lifecycle::default();
        assert_eq!(life.state(), GenState::Created);
        life.skipped.set(true);
        assert_eq!(life.state(), GenState::Skipped);
        assert!(life.prepare(|| true));
        assert_eq!(life.state(), GenState::Prepared);
        life.written.set(true);
        assert_eq!(life.state(), GenState::Written);
    }

    #[test]
    fn prepare_runs_once() {
        let life = Lifecycle::default();
        let calls = Cell::new(0);
        assert!(!life.prepare(|| {
            calls.set(calls.get() + 1);
            false
        }));
        assert!(!life.prepare(|| {
            calls.set(calls.get() + 1);
            true
        }));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reentrant_prepare_fails() {
        let life = Lifecycle::default();
        let ok = life.prepare(|| !life.prepare(|| true));
        assert!(ok);
    }

    #[test]
    fn config_defaults() {
        let c = GenConfig::default();
        assert!(c.all_interfaces_referenced);
        assert!(c.all_messages_referenced);
        assert_eq!(c.protocol_config().logger.min_level, Severity::Info);
    }
}
