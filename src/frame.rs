//! Frames: the ordered stack of layers wrapping every message on the wire.
//!
//! Layers are kept in declared order. The order in which generated code
//! processes them may differ (a checksum calculated from a later layer is
//! handled right before it); [`Frame::processing_order`] computes it.

use crate::common;
use crate::diag::Logger;
use crate::error::{DslError, DslResult};
use crate::layer::{Layer, LayerKind};
use crate::props::{self, Extra, Props};
use crate::registry::{ParseCtx, Registry};
use crate::xml::{SrcPos, XmlNode};

pub const FRAME: &str = "frame";
pub const FRAMES: &str = "frames";
pub const LAYERS: &str = "layers";

const PROP_NAMES: &[&str] = &[props::NAME, props::DESCRIPTION];

#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub description: String,
    /// Declared order.
    pub layers: Vec<Layer>,
    pub extra: Extra,
    pub pos: SrcPos,
}

impl Frame {
    pub fn create(node: &XmlNode, ctx: ParseCtx<'_>) -> DslResult<Frame> {
        let logger = ctx.logger;
        let p = Props::new(node, PROP_NAMES);
        let name = p.required(props::NAME, logger)?;
        if !common::is_valid_name(&name) {
            return Err(props::structural(
                logger,
                p.pos(),
                format!("Invalid value for name property \"{}\".", name),
            ));
        }
        let description = p.single(props::DESCRIPTION, logger)?.unwrap_or_default();

        let mut layers = Vec::new();
        for layer_node in layer_nodes(node, logger)? {
            let layer = Layer::create(layer_node, ctx)?;
            if let Some(prev) = layers.iter().find(|l: &&Layer| l.name == layer.name) {
                return Err(props::structural(
                    logger,
                    &layer.pos,
                    format!(
                        "Layer with name \"{}\" has already been defined within the same frame at {}:{}.",
                        layer.name, prev.pos.file, prev.pos.line
                    ),
                ));
            }
            layers.push(layer);
        }
        if layers.is_empty() {
            return Err(props::structural(
                logger,
                p.pos(),
                format!("The frame \"{}\" must contain at least one layer.", name),
            ));
        }
        if !layers.iter().any(|l| l.kind() == LayerKind::Payload) {
            return Err(props::semantic(
                logger,
                p.pos(),
                format!("The frame \"{}\" must contain a \"payload\" layer.", name),
            ));
        }
        for (idx, layer) in layers.iter().enumerate() {
            layer.verify(idx, &layers, logger)?;
        }

        let mut children: Vec<&str> = LayerKind::names().to_vec();
        children.push(LAYERS);
        let extra = p.check_unknown(&[PROP_NAMES], &children, logger)?;
        tracing::trace!(target: "commsdsl", name = %name, layers = layers.len(), "frame created");
        Ok(Frame {
            name,
            description,
            layers,
            extra,
            pos: node.pos.clone(),
        })
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn payload_idx(&self) -> Option<usize> {
        self.layers.iter().position(|l| l.kind() == LayerKind::Payload)
    }

    /// An `id` layer, or a custom layer replacing it.
    pub fn has_id_layer(&self) -> bool {
        self.layers.iter().any(|l| l.semantic_kind() == LayerKind::Id)
    }

    /// Indices into [`Frame::layers`] in the order the layers are processed.
    ///
    /// Layers are scanned repeatedly; any move restarts the scan and a full
    /// scan without moves ends it. More moves than there are layers means the
    /// stack never settles.
    pub fn processing_order(&self, logger: &Logger) -> DslResult<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.layers.len()).collect();
        let mut moves = 0;
        'scan: loop {
            for pos in 0..order.len() {
                let layer = &self.layers[order[pos]];
                if !layer.rearrange(pos, &mut order, &self.layers, logger)? {
                    continue;
                }
                moves += 1;
                if self.layers.len() < moves {
                    logger.error(format!(
                        "{}Layers of frame \"{}\" keep moving, giving up.",
                        self.pos, self.name
                    ));
                    return Err(DslError::NonConvergingLayers(self.name.clone()));
                }
                continue 'scan;
            }
            break;
        }
        tracing::debug!(target: "commsdsl", frame = %self.name, moves, "layers arranged");
        Ok(order)
    }

    pub fn ordered_layers(&self, logger: &Logger) -> DslResult<Vec<&Layer>> {
        Ok(self
            .processing_order(logger)?
            .into_iter()
            .map(|i| &self.layers[i])
            .collect())
    }

    /// Minimal number of bytes following the payload.
    pub fn back_payload_offset(&self, reg: &Registry) -> usize {
        let Some(payload) = self.payload_idx() else {
            return 0;
        };
        self.layers[payload + 1..]
            .iter()
            .fold(0, |acc, l| common::add_length(acc, l.min_length(reg)))
    }

    pub fn pseudo_version_layers<'a>(&'a self, reg: &'a Registry) -> impl Iterator<Item = &'a Layer> + 'a {
        self.layers.iter().filter(move |l| l.is_pseudo_version(reg))
    }

    pub fn has_pseudo_version_layer(&self, reg: &Registry) -> bool {
        self.pseudo_version_layers(reg).next().is_some()
    }
}

/// Layer elements given directly or wrapped in a single `<layers>` group.
fn layer_nodes<'a>(node: &'a XmlNode, logger: &Logger) -> DslResult<Vec<&'a XmlNode>> {
    let direct: Vec<&XmlNode> = node.children_in(LayerKind::names()).collect();
    let groups: Vec<&XmlNode> = node.children_named(LAYERS).collect();
    match groups.as_slice() {
        [] => Ok(direct),
        [group] => {
            if !direct.is_empty() {
                return Err(props::structural(
                    logger,
                    &group.pos,
                    format!(
                        "The \"{}\" child element cannot be used together with other layers.",
                        LAYERS
                    ),
                ));
            }
            if let Some(other) = group
                .children
                .iter()
                .find(|c| LayerKind::from_name(&c.name).is_none())
            {
                return Err(props::structural(
                    logger,
                    &other.pos,
                    format!("The \"{}\" element cannot contain \"{}\".", LAYERS, other.name),
                ));
            }
            Ok(group.children.iter().collect())
        }
        [_, second, ..] => Err(props::structural(
            logger,
            &second.pos,
            format!("Only single \"{}\" child element is supported for \"{}\".", LAYERS, FRAME),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::InnerField;
    use crate::layer::{ChecksumAlg, ChecksumLayer, ChecksumRange, LayerDef};

    fn layer(name: &str, def: LayerDef) -> Layer {
        Layer {
            name: name.to_string(),
            display_name: String::new(),
            description: String::new(),
            field: InnerField::Missing,
            def,
            extra: Extra::default(),
            pos: SrcPos::default(),
        }
    }

    fn checksum(name: &str, from: &str, until: &str) -> Layer {
        layer(
            name,
            LayerDef::Checksum(ChecksumLayer {
                alg: ChecksumAlg::Crc16Ccitt,
                alg_name: String::new(),
                range: ChecksumRange {
                    from: from.to_string(),
                    until: until.to_string(),
                },
                verify_before_read: false,
            }),
        )
    }

    fn frame(layers: Vec<Layer>) -> Frame {
        Frame {
            name: "Frame".to_string(),
            description: String::new(),
            layers,
            extra: Extra::default(),
            pos: SrcPos::default(),
        }
    }

    #[test]
    fn checksum_from_moves_before_source() {
        let f = frame(vec![
            layer("Sync", LayerDef::Sync),
            layer("Size", LayerDef::Size),
            layer("Id", LayerDef::Id),
            layer("Data", LayerDef::Payload),
            checksum("Checksum", "Size", ""),
        ]);
        let logger = Logger::default();
        let order = f.processing_order(&logger).unwrap();
        let names: Vec<&str> = order.iter().map(|i| f.layers[*i].name.as_str()).collect();
        assert_eq!(names, ["Sync", "Checksum", "Size", "Id", "Data"]);
    }

    #[test]
    fn checksum_until_payload_stays() {
        let f = frame(vec![
            checksum("Checksum", "", "Data"),
            layer("Id", LayerDef::Id),
            layer("Data", LayerDef::Payload),
        ]);
        let logger = Logger::default();
        assert_eq!(f.processing_order(&logger).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn checksum_until_non_payload_fails() {
        let f = frame(vec![
            checksum("Checksum", "", "Id"),
            layer("Id", LayerDef::Id),
            layer("Data", LayerDef::Payload),
        ]);
        let (logger, diags) = Logger::capturing(Default::default());
        assert!(f.processing_order(&logger).is_err());
        assert!(diags.borrow().iter().any(|d| d.message.contains("until payload layer")));
    }

    #[test]
    fn arranged_order_is_stable() {
        let f = frame(vec![
            layer("Size", LayerDef::Size),
            layer("Data", LayerDef::Payload),
            checksum("Checksum", "Size", ""),
        ]);
        let logger = Logger::default();
        let order = f.processing_order(&logger).unwrap();
        let mut again = order.clone();
        for pos in 0..again.len() {
            let l = &f.layers[again[pos]];
            assert!(!l.rearrange(pos, &mut again, &f.layers, &logger).unwrap());
        }
        assert_eq!(order, again);
    }

    #[test]
    fn id_layer_detection() {
        let f = frame(vec![layer("Data", LayerDef::Payload)]);
        assert!(!f.has_id_layer());
        let reg = Registry::default();
        assert_eq!(f.back_payload_offset(&reg), 0);
    }
}
