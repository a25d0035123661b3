//! Auxiliary fields attached to sequences: length/count prefixes and
//! termination suffixes.

use crate::common::{self, SIBLING_REF_PREFIX};
use crate::error::DslResult;
use crate::props;
use crate::registry::{FieldId, ParseCtx, Registry};
use crate::xml::XmlNode;

use super::{Field, FieldCommon, Kind, KindParse, SemanticType};

/// Where a sequence finds one of its auxiliary fields.
#[derive(Debug, Clone, Default)]
pub enum Prefix {
    #[default]
    None,
    /// Field defined elsewhere in the schema.
    External(FieldId),
    /// Sibling in the enclosing bundle or message, written as `$name`.
    Detached(String),
    /// Field defined in place.
    Local(Box<Field>),
}

impl Prefix {
    pub fn is_none(&self) -> bool {
        matches!(self, Prefix::None)
    }

    /// Prefix serialized together with the sequence itself.
    pub fn has_field(&self) -> bool {
        matches!(self, Prefix::External(_) | Prefix::Local(_))
    }

    pub fn field<'a>(&'a self, reg: &'a Registry) -> Option<&'a Field> {
        match self {
            Prefix::External(id) => Some(reg.field(*id)),
            Prefix::Local(f) => Some(f),
            _ => None,
        }
    }

    pub fn detached(&self) -> Option<&str> {
        match self {
            Prefix::Detached(name) => Some(name),
            _ => None,
        }
    }

    pub fn min_length(&self, reg: &Registry) -> usize {
        self.field(reg).map(|f| f.min_length(reg)).unwrap_or(0)
    }

    pub fn max_length(&self, reg: &Registry) -> usize {
        self.field(reg).map(|f| f.max_length(reg)).unwrap_or(0)
    }

    /// Largest value an integer prefix can carry.
    pub fn max_value(&self, reg: &Registry) -> Option<usize> {
        let int = self.field(reg)?.non_ref(reg).as_int()?;
        Some(usize::try_from(int.max_value().max(0)).unwrap_or(common::MAX_POSSIBLE_LENGTH))
    }

    /// Prefix length plus the largest number of bytes it can announce.
    pub fn max_span(&self, reg: &Registry) -> Option<usize> {
        let value = self.max_value(reg)?;
        Some(common::add_length(self.max_length(reg), value))
    }
}

fn is_length_like(field: &Field) -> bool {
    field.kind() == Kind::Int || field.semantic_type() == SemanticType::Length
}

/// Read the `prop` auxiliary field of a sequence, either as a property value
/// (`$sibling` or a field reference) or as a child element defining the field.
/// Leaves `current` untouched when nothing is specified.
pub(crate) fn parse_prefix(
    p: &KindParse<'_>,
    common: &FieldCommon,
    kind: Kind,
    prop: &str,
    current: &mut Prefix,
) -> DslResult<()> {
    let in_props = p.node().attr(prop).is_some();
    if let Some(value) = p.node().attr(prop) {
        *current = prefix_from_ref(p, prop, value.trim())?;
    }

    let children: Vec<&XmlNode> = p.node().children_named(prop).collect();
    if children.is_empty() {
        return Ok(());
    }
    if 1 < children.len() {
        return Err(p.structural(format!("There must be only one occurance of \"{}\".", prop)));
    }
    let child = children[0];
    let defs: Vec<&XmlNode> = child
        .children
        .iter()
        .filter(|c| Kind::from_name(&c.name).is_some())
        .collect();
    if 1 < defs.len() {
        return Err(p.error_at(
            child,
            format!("The \"{}\" element is expected to define only single field", prop),
        ));
    }
    let Some(def) = defs.first() else {
        // Child holds a reference as its value.
        let value = props::node_value(child, p.logger())?;
        if in_props {
            return Err(p.error(format!(
                "The \"{}\" element is expected to define only single field",
                prop
            )));
        }
        if value.is_empty() {
            return Err(p.error_at(
                child,
                format!("The \"{}\" element is expected to define field as child element", prop),
            ));
        }
        *current = prefix_from_ref(p, prop, &value)?;
        return Ok(());
    };
    if in_props {
        return Err(p.error(format!(
            "The \"{}\" element is expected to define only single field",
            prop
        )));
    }

    let ctx = p.member_ctx(kind, common.versions);
    let field = Field::create(def, ctx)?;
    if !is_length_like(&field) {
        return Err(p.error(format!(
            "The \"{}\" element must be of type \"{}\" or have semanticType=\"length\" property set.",
            prop,
            Kind::Int.as_str()
        )));
    }
    *current = Prefix::Local(Box::new(field));
    Ok(())
}

fn prefix_from_ref(p: &KindParse<'_>, prop: &str, value: &str) -> DslResult<Prefix> {
    if value.is_empty() {
        return Err(p.unexpected(prop, value));
    }
    if let Some(rest) = value.strip_prefix(SIBLING_REF_PREFIX) {
        p.check_detached_prefix_allowed()?;
        let name = common::normalise_string(rest);
        if name.is_empty() {
            return Err(p.unexpected(prop, value));
        }
        return Ok(Prefix::Detached(name));
    }
    let Some(id) = p.ctx.find_field_id(value) else {
        return Err(p.error(format!(
            "Cannot find field referenced by \"{}\" property ({}).",
            prop, value
        )));
    };
    if !is_length_like(p.ctx.registry.field(id)) {
        return Err(p.error(format!(
            "The field referenced by \"{}\" property ({}) must be of type \"{}\" or have semanticType=\"length\" property set.",
            prop,
            value,
            Kind::Int.as_str()
        )));
    }
    Ok(Prefix::External(id))
}

/// A detached prefix must name an earlier sibling of a suitable kind.
pub(crate) fn verify_detached(
    this: &FieldCommon,
    prefix: &Prefix,
    siblings: &[Field],
    ctx: &ParseCtx<'_>,
) -> DslResult<()> {
    let Some(name) = prefix.detached() else {
        return Ok(());
    };
    let Some(sibling) = find_sibling(siblings, name) else {
        return Err(props::semantic(
            ctx.logger,
            &this.pos,
            format!(
                "The holding bundle/message does not contain field named \"{}\".",
                name
            ),
        ));
    };
    let kind = sibling.non_ref(ctx.registry).kind();
    if kind != Kind::Int && sibling.semantic_type() != SemanticType::Length {
        return Err(props::semantic(
            ctx.logger,
            &this.pos,
            format!(
                "Detached prefix \"{}\" is expected to be of \"{}\" type or have semanticType=\"length\" property set.",
                name,
                Kind::Int.as_str()
            ),
        ));
    }
    Ok(())
}

fn find_sibling<'a>(siblings: &'a [Field], name: &str) -> Option<&'a Field> {
    let mut fields = siblings;
    let mut rest = name;
    loop {
        let (first, tail) = common::split_first(rest);
        let found = fields.iter().find(|f| f.name() == first)?;
        if tail.is_empty() {
            return Some(found);
        }
        fields = found.members();
        rest = tail;
    }
}
