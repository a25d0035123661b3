//! Frame layers: one stage of the transport stack wrapping a message payload.
//!
//! Every layer except `payload` carries a field, defined inline or referenced
//! by `field="ns.Name"`. Kind-specific properties live in [`LayerDef`].

use crate::common;
use crate::diag::Logger;
use crate::error::DslResult;
use crate::field::{self, Field, InnerField, Kind, SemanticType};
use crate::props::{self, Extra, Props};
use crate::registry::{InterfaceId, ParseCtx, Parent, Registry};
use crate::schema::Feature;
use crate::version::VersionWindow;
use crate::xml::{SrcPos, XmlNode};

pub const FIELD: &str = "field";
pub const ALG: &str = "alg";
pub const ALG_NAME: &str = "algName";
pub const FROM: &str = "from";
pub const UNTIL: &str = "until";
pub const VERIFY_BEFORE_READ: &str = "verifyBeforeRead";
pub const INTERFACES: &str = "interfaces";
pub const INTERFACE_FIELD_NAME: &str = "interfaceFieldName";
pub const PSEUDO: &str = "pseudo";
pub const ID_REPLACEMENT: &str = "idReplacement";
pub const SEMANTIC_LAYER_TYPE: &str = "semanticLayerType";
pub const CHECKSUM_FROM: &str = "checksumFrom";
pub const CHECKSUM_UNTIL: &str = "checksumUntil";

const COMMON_PROPS: &[&str] = &[props::NAME, props::DESCRIPTION, props::DISPLAY_NAME];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Custom,
    Sync,
    Size,
    Id,
    Value,
    Payload,
    Checksum,
}

impl LayerKind {
    pub const ALL: [LayerKind; 7] = [
        LayerKind::Custom,
        LayerKind::Sync,
        LayerKind::Size,
        LayerKind::Id,
        LayerKind::Value,
        LayerKind::Payload,
        LayerKind::Checksum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Custom => "custom",
            LayerKind::Sync => "sync",
            LayerKind::Size => "size",
            LayerKind::Id => "id",
            LayerKind::Value => "value",
            LayerKind::Payload => "payload",
            LayerKind::Checksum => "checksum",
        }
    }

    pub fn from_name(name: &str) -> Option<LayerKind> {
        LayerKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    pub fn names() -> &'static [&'static str] {
        &["custom", "sync", "size", "id", "value", "payload", "checksum"]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlg {
    #[default]
    Custom,
    Sum,
    Crc16Ccitt,
    Crc16,
    Crc32,
    Xor,
}

impl ChecksumAlg {
    pub fn parse(value: &str) -> Option<ChecksumAlg> {
        match value.to_ascii_lowercase().as_str() {
            "custom" => Some(ChecksumAlg::Custom),
            "sum" => Some(ChecksumAlg::Sum),
            "crc-ccitt" | "crc_ccitt" => Some(ChecksumAlg::Crc16Ccitt),
            "crc-16" | "crc_16" => Some(ChecksumAlg::Crc16),
            "crc-32" | "crc_32" => Some(ChecksumAlg::Crc32),
            "xor" => Some(ChecksumAlg::Xor),
            _ => None,
        }
    }
}

/// Layers the checksum is calculated on: from `from` up to the checksum
/// itself, or from the checksum up to `until`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumRange {
    pub from: String,
    pub until: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChecksumLayer {
    pub alg: ChecksumAlg,
    /// Name of the custom algorithm.
    pub alg_name: String,
    pub range: ChecksumRange,
    pub verify_before_read: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ValueLayer {
    pub interfaces: Vec<InterfaceId>,
    pub field_name: String,
    /// Position of `field_name` in every listed interface.
    pub field_idx: usize,
    pub pseudo: bool,
}

#[derive(Debug, Clone)]
pub struct CustomLayer {
    /// Role of the custom layer, `Custom` when it has none.
    pub semantic_layer_type: LayerKind,
    pub range: ChecksumRange,
}

impl Default for CustomLayer {
    fn default() -> Self {
        CustomLayer {
            semantic_layer_type: LayerKind::Custom,
            range: ChecksumRange::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LayerDef {
    Custom(CustomLayer),
    Sync,
    Size,
    Id,
    Value(ValueLayer),
    Payload,
    Checksum(ChecksumLayer),
}

impl LayerDef {
    fn new(kind: LayerKind) -> LayerDef {
        match kind {
            LayerKind::Custom => LayerDef::Custom(CustomLayer::default()),
            LayerKind::Sync => LayerDef::Sync,
            LayerKind::Size => LayerDef::Size,
            LayerKind::Id => LayerDef::Id,
            LayerKind::Value => LayerDef::Value(ValueLayer::default()),
            LayerKind::Payload => LayerDef::Payload,
            LayerKind::Checksum => LayerDef::Checksum(ChecksumLayer::default()),
        }
    }

    fn extra_props(&self) -> &'static [&'static str] {
        match self {
            LayerDef::Checksum(_) => &[ALG, ALG_NAME, FROM, UNTIL, VERIFY_BEFORE_READ],
            LayerDef::Value(_) => &[INTERFACES, INTERFACE_FIELD_NAME, PSEUDO],
            LayerDef::Custom(_) => &[ID_REPLACEMENT, SEMANTIC_LAYER_TYPE, CHECKSUM_FROM, CHECKSUM_UNTIL],
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub field: InnerField,
    pub def: LayerDef,
    pub extra: Extra,
    pub pos: SrcPos,
}

struct LayerParse<'a> {
    props: Props<'a>,
    ctx: ParseCtx<'a>,
}

impl<'a> LayerParse<'a> {
    fn logger(&self) -> &'a Logger {
        self.ctx.logger
    }

    fn pos(&self) -> &'a SrcPos {
        self.props.pos()
    }

    fn single(&self, name: &str) -> DslResult<Option<String>> {
        self.props.single(name, self.ctx.logger)
    }

    fn error(&self, msg: impl AsRef<str>) -> crate::error::DslError {
        props::semantic(self.ctx.logger, self.pos(), msg)
    }

    fn unexpected(&self, prop: &str, value: &str) -> crate::error::DslError {
        props::unexpected_value(self.ctx.logger, self.props.node(), prop, value)
    }

    /// Property gated on the schema DSL version; ignored with a warning.
    fn gated(&self, name: &str) -> DslResult<Option<String>> {
        let v = self.single(name)?;
        if v.is_some() && !self.ctx.schema_props().property_supported(name) {
            props::warn(
                self.logger(),
                self.pos(),
                format!(
                    "Property \"{}\" is not supported for selected dslVersion, ignoring...",
                    name
                ),
            );
            return Ok(None);
        }
        Ok(v)
    }
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match &self.def {
            LayerDef::Custom(_) => LayerKind::Custom,
            LayerDef::Sync => LayerKind::Sync,
            LayerDef::Size => LayerKind::Size,
            LayerDef::Id => LayerKind::Id,
            LayerDef::Value(_) => LayerKind::Value,
            LayerDef::Payload => LayerKind::Payload,
            LayerDef::Checksum(_) => LayerKind::Checksum,
        }
    }

    /// The layer's own kind, or the role a custom layer plays.
    pub fn semantic_kind(&self) -> LayerKind {
        match &self.def {
            LayerDef::Custom(c) => c.semantic_layer_type,
            _ => self.kind(),
        }
    }

    pub fn field<'a>(&'a self, reg: &'a Registry) -> Option<&'a Field> {
        self.field.field(reg)
    }

    pub fn as_checksum(&self) -> Option<&ChecksumLayer> {
        match &self.def {
            LayerDef::Checksum(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueLayer> {
        match &self.def {
            LayerDef::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_custom(&self) -> Option<&CustomLayer> {
        match &self.def {
            LayerDef::Custom(c) => Some(c),
            _ => None,
        }
    }

    /// Checksum range of a checksum layer or a custom layer acting as one.
    pub fn checksum_range(&self) -> Option<&ChecksumRange> {
        match &self.def {
            LayerDef::Checksum(c) => Some(&c.range),
            LayerDef::Custom(c) if c.semantic_layer_type == LayerKind::Checksum => Some(&c.range),
            _ => None,
        }
    }

    pub fn min_length(&self, reg: &Registry) -> usize {
        self.field(reg).map(|f| f.min_length(reg)).unwrap_or(0)
    }

    pub fn create(node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<Layer> {
        let logger = ctx.logger;
        let Some(kind) = LayerKind::from_name(&node.name) else {
            return Err(props::structural(
                logger,
                &node.pos,
                format!("Unknown layer type \"{}\".", node.name),
            ));
        };
        let def = LayerDef::new(kind);
        let mut child_props: Vec<&str> = COMMON_PROPS.to_vec();
        child_props.extend_from_slice(def.extra_props());
        let p = LayerParse {
            props: Props::with_possible(node, &child_props, &[FIELD]),
            ctx: ctx.nested(Parent::Layer, VersionWindow::default()),
        };

        let mut layer = Layer {
            name: String::new(),
            display_name: String::new(),
            description: String::new(),
            field: InnerField::Missing,
            def,
            extra: Extra::default(),
            pos: node.pos.clone(),
        };
        layer.update_names(&p)?;
        layer.update_field(&p)?;
        match &mut layer.def {
            LayerDef::Checksum(c) => c.parse(&p)?,
            LayerDef::Value(v) => v.parse(&p)?,
            LayerDef::Custom(c) => c.parse(&p)?,
            _ => {}
        }

        let mut known: Vec<&str> = child_props.clone();
        known.push(FIELD);
        let mut children = known.clone();
        children.extend_from_slice(Kind::names());
        layer.extra = p.props.check_unknown(&[known.as_slice()], &children, logger)?;
        Ok(layer)
    }

    fn update_names(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        let logger = p.logger();
        self.name = p.props.required(props::NAME, logger)?;
        if !common::is_valid_name(&self.name) {
            return Err(props::structural(
                logger,
                p.pos(),
                format!("Invalid value for name property \"{}\".", self.name),
            ));
        }
        if let Some(v) = p.single(props::DISPLAY_NAME)? {
            if p.ctx.supports(Feature::ElementDisplayName) {
                self.display_name = v;
            } else {
                props::warn(
                    logger,
                    p.pos(),
                    format!(
                        "The property \"{}\" of layer is not supported for dslVersion={}.",
                        props::DISPLAY_NAME,
                        p.ctx.schema_props().dsl_version
                    ),
                );
            }
        }
        if let Some(v) = p.single(props::DESCRIPTION)? {
            self.description = v;
        }
        Ok(())
    }

    fn update_field(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        let from_prop = p.single(FIELD)?;
        if let Some(reference) = &from_prop {
            let Some(id) = p.ctx.find_field_id(reference) else {
                return Err(p.error(format!(
                    "Cannot find field referenced by \"{}\" property ({}).",
                    FIELD, reference
                )));
            };
            self.field = InnerField::External(id);
        }
        if let Some(node) = field::wrapped_field_node(p.props.node(), FIELD, from_prop.is_some(), p.logger())? {
            self.field = InnerField::Local(Box::new(Field::create(node, p.ctx)?));
        }

        let must_have = self.kind() != LayerKind::Payload;
        match (self.field.is_missing(), must_have) {
            (false, false) => Err(p.error("This layer mustn't specify field.")),
            (true, true) => Err(p.error("This layer must specify field.")),
            _ => Ok(()),
        }
    }

    /// Position checks against the other layers of the frame.
    pub fn verify(&self, idx: usize, layers: &[Layer], logger: &Logger) -> DslResult<()> {
        match self.kind() {
            LayerKind::Payload | LayerKind::Id | LayerKind::Size => self.verify_single(idx, layers, logger)?,
            _ => {}
        }
        if matches!(self.kind(), LayerKind::Id | LayerKind::Size | LayerKind::Sync | LayerKind::Value) {
            self.verify_before_payload(idx, layers, logger)?;
        }
        match &self.def {
            LayerDef::Checksum(c) => self.verify_range(idx, layers, &c.range, (FROM, UNTIL), logger),
            LayerDef::Custom(c) if c.semantic_layer_type == LayerKind::Checksum => {
                if c.range.from.is_empty() && c.range.until.is_empty() {
                    return Err(props::semantic(
                        logger,
                        &self.pos,
                        format!(
                            "Custom layer with {}=\"checksum\" must set \"{}\" or \"{}\" property to indicate on what values checksum is calculated.",
                            SEMANTIC_LAYER_TYPE, CHECKSUM_FROM, CHECKSUM_UNTIL
                        ),
                    ));
                }
                self.verify_range(idx, layers, &c.range, (CHECKSUM_FROM, CHECKSUM_UNTIL), logger)
            }
            _ => Ok(()),
        }
    }

    fn verify_single(&self, idx: usize, layers: &[Layer], logger: &Logger) -> DslResult<()> {
        let kind = self.kind();
        match layers.iter().enumerate().find(|(i, l)| *i != idx && l.kind() == kind) {
            Some((_, other)) => Err(props::semantic(
                logger,
                &other.pos,
                format!("Only single \"{}\" layer can exist in the frame.", kind.as_str()),
            )),
            None => Ok(()),
        }
    }

    fn verify_before_payload(&self, idx: usize, layers: &[Layer], logger: &Logger) -> DslResult<()> {
        let payload = layers.iter().position(|l| l.kind() == LayerKind::Payload);
        match payload {
            Some(p) if idx < p => Ok(()),
            _ => Err(props::semantic(
                logger,
                &self.pos,
                "This layer is expected to be before the \"payload\" one.",
            )),
        }
    }

    fn verify_range(
        &self,
        idx: usize,
        layers: &[Layer],
        range: &ChecksumRange,
        (from_prop, until_prop): (&str, &str),
        logger: &Logger,
    ) -> DslResult<()> {
        let find = |name: &str| layers.iter().position(|l| l.name == name);
        let unexpected = |prop: &str, value: &str| {
            props::semantic(
                logger,
                &self.pos,
                format!(
                    "Property \"{}\" of layer \"{}\" has unexpected value ({}).",
                    prop, self.name, value
                ),
            )
        };
        if !range.from.is_empty() {
            let from = find(&range.from).ok_or_else(|| unexpected(from_prop, &range.from))?;
            if idx <= from {
                return Err(props::semantic(
                    logger,
                    &self.pos,
                    format!("Layer \"{}\" must appear before the \"{}\".", range.from, self.name),
                ));
            }
        }
        if !range.until.is_empty() {
            let until = find(&range.until).ok_or_else(|| unexpected(until_prop, &range.until))?;
            if until <= idx {
                return Err(props::semantic(
                    logger,
                    &self.pos,
                    format!("Layer \"{}\" must appear after the \"{}\".", range.until, self.name),
                ));
            }
        }
        Ok(())
    }

    /// Move this layer (at `order[pos]`) to where generated code expects it.
    /// Returns whether `order` changed.
    ///
    /// A checksum calculated `from` another layer sits right before that
    /// layer; one calculated `until` the payload stays in place.
    pub fn rearrange(&self, pos: usize, order: &mut Vec<usize>, layers: &[Layer], logger: &Logger) -> DslResult<bool> {
        let Some(range) = self.checksum_range() else {
            return Ok(false);
        };
        let find = |order: &[usize], name: &str| order.iter().position(|i| layers[*i].name == name);

        if !range.until.is_empty() {
            let until = find(order, &range.until).map(|p| &layers[order[p]]);
            return match until {
                Some(l) if l.kind() == LayerKind::Payload => Ok(false),
                _ => Err(props::semantic(
                    logger,
                    &self.pos,
                    "Checksum prefix must be until payload layer",
                )),
            };
        }

        let Some(from) = find(order, &range.from) else {
            return Err(props::semantic(
                logger,
                &self.pos,
                "Info on checksum layer is missing",
            ));
        };
        if pos + 1 == from {
            return Ok(false);
        }
        let this = order.remove(pos);
        let from = find(order, &range.from).unwrap_or(order.len());
        order.insert(from, this);
        tracing::debug!(target: "commsdsl", layer = %self.name, before = %range.from, "checksum layer moved");
        Ok(true)
    }

    /// Value layer carrying the protocol version that is absent on the wire.
    pub fn is_pseudo_version(&self, reg: &Registry) -> bool {
        let Some(v) = self.as_value() else {
            return false;
        };
        let Some(field) = self.field(reg) else {
            return false;
        };
        if !v.pseudo && !field.is_pseudo() {
            return false;
        }
        if field.semantic_type() == SemanticType::Version
            || field.non_ref(reg).semantic_type() == SemanticType::Version
        {
            return true;
        }
        v.interfaces.iter().any(|id| {
            reg.interface(*id)
                .find_field(&v.field_name)
                .map(|f| f.semantic_type() == SemanticType::Version)
                .unwrap_or(false)
        })
    }
}

impl ChecksumLayer {
    fn parse(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        let alg = p.props.required(ALG, p.logger())?;
        self.alg = ChecksumAlg::parse(&alg).ok_or_else(|| p.unexpected(ALG, &alg))?;
        if self.alg == ChecksumAlg::Custom {
            let name = p.props.required(ALG_NAME, p.logger())?;
            if !common::is_valid_name(&name) {
                return Err(p.unexpected(ALG_NAME, &name));
            }
            self.alg_name = name;
        }
        if let Some(v) = p.single(FROM)? {
            self.range.from = v;
        }
        if let Some(v) = p.single(UNTIL)? {
            self.range.until = v;
        }
        if self.range.from.is_empty() && self.range.until.is_empty() {
            return Err(p.error(format!(
                "Checksum layer must set \"{}\" or \"{}\" property to indicate on what values checksum is calculated.",
                FROM, UNTIL
            )));
        }
        if let Some(b) = p.props.bool_prop(VERIFY_BEFORE_READ, p.logger())? {
            self.verify_before_read = b;
        }
        Ok(())
    }
}

impl ValueLayer {
    fn parse(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        self.update_interfaces(p)?;
        self.update_field_name(p)?;
        if let Some(b) = p.props.bool_prop(PSEUDO, p.logger())? {
            self.pseudo = b;
        }
        Ok(())
    }

    fn update_interfaces(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        let reg = p.ctx.registry;
        match p.single(INTERFACES)? {
            None => {
                self.interfaces = reg
                    .interface_ids()
                    .filter(|id| reg.interface_entry(*id).schema == p.ctx.schema)
                    .collect();
            }
            Some(list) => {
                for name in list.split(',') {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(p.unexpected(INTERFACES, &list));
                    }
                    let Some((schema, path)) = p.ctx.split_schema(name) else {
                        return Err(p.error(format!("Unknown interface \"{}\".", name)));
                    };
                    let Some(id) = reg.find_interface(schema, path) else {
                        return Err(p.error(format!("Unknown interface \"{}\".", name)));
                    };
                    self.interfaces.push(id);
                }
            }
        }
        if self.interfaces.is_empty() {
            return Err(p.error("No valid interfaces have been defined."));
        }
        Ok(())
    }

    fn update_field_name(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        let reg = p.ctx.registry;
        self.field_name = p.props.required(INTERFACE_FIELD_NAME, p.logger())?;
        if self.field_name.is_empty() {
            return Err(p.unexpected(INTERFACE_FIELD_NAME, ""));
        }
        let mut expected = None;
        for id in &self.interfaces {
            let iface = reg.interface(*id);
            let Some(idx) = iface.fields.iter().position(|f| f.name() == self.field_name) else {
                return Err(p.error(format!(
                    "Interface \"{}\" doesn't contain field named \"{}\"",
                    iface.name, self.field_name
                )));
            };
            match expected {
                None => expected = Some(idx),
                Some(e) if e != idx => {
                    return Err(p.error(format!(
                        "Index of field \"{}\" ({}) in \"{}\" interface differs from expected ({}).",
                        self.field_name, idx, iface.name, e
                    )));
                }
                Some(_) => {}
            }
        }
        self.field_idx = expected.unwrap_or(0);
        Ok(())
    }
}

impl CustomLayer {
    fn parse(&mut self, p: &LayerParse<'_>) -> DslResult<()> {
        if p.props.bool_prop(ID_REPLACEMENT, p.logger())? == Some(true) {
            self.semantic_layer_type = LayerKind::Id;
        }
        if let Some(v) = p.gated(SEMANTIC_LAYER_TYPE)? {
            if !v.is_empty() {
                if self.semantic_layer_type != LayerKind::Custom {
                    return Err(p.error(format!(
                        "Cannot use \"{}\" property when semantic type was specified by other (deprecated) properties",
                        SEMANTIC_LAYER_TYPE
                    )));
                }
                self.semantic_layer_type =
                    LayerKind::from_name(&v).ok_or_else(|| p.unexpected(SEMANTIC_LAYER_TYPE, &v))?;
            }
        }
        for (prop, slot) in [
            (CHECKSUM_FROM, &mut self.range.from),
            (CHECKSUM_UNTIL, &mut self.range.until),
        ] {
            let Some(v) = p.gated(prop)? else {
                continue;
            };
            if self.semantic_layer_type != LayerKind::Checksum {
                props::warn(
                    p.logger(),
                    p.pos(),
                    format!(
                        "Property \"{}\" is not applicable to selected \"{}\", ignoring...",
                        prop, SEMANTIC_LAYER_TYPE
                    ),
                );
                continue;
            }
            *slot = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names() {
        for k in LayerKind::ALL {
            assert_eq!(LayerKind::from_name(k.as_str()), Some(k));
        }
        assert_eq!(LayerKind::from_name("frame"), None);
    }

    #[test]
    fn checksum_algorithms() {
        assert_eq!(ChecksumAlg::parse("CRC-CCITT"), Some(ChecksumAlg::Crc16Ccitt));
        assert_eq!(ChecksumAlg::parse("crc_32"), Some(ChecksumAlg::Crc32));
        assert_eq!(ChecksumAlg::parse("md5"), None);
    }
}
