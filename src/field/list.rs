//! `list` fields: a sequence of elements of a single field type.
//!
//! The number of elements is given by exactly one of: a fixed `count`, a
//! `countPrefix`, a `lengthPrefix` (serialized length in bytes) or a
//! `termSuffix`. Without any of them the list runs until the end of the
//! enclosing buffer. `elemLengthPrefix` adds a length before every element, or
//! once before the first element when `elemFixedLength` is set.

use crate::common;
use crate::error::DslResult;
use crate::registry::{ParseCtx, Registry};

use super::data::LENGTH_PREFIX;
use super::prefix::{self, Prefix};
use super::{
    inline_field_node, Field, FieldCommon, FieldImpl, FieldRefType, InnerField, Kind, KindParse,
};

pub const ELEMENT: &str = "element";
pub const COUNT: &str = "count";
pub const COUNT_PREFIX: &str = "countPrefix";
pub const ELEM_LENGTH_PREFIX: &str = "elemLengthPrefix";
pub const ELEM_FIXED_LENGTH: &str = "elemFixedLength";
pub const TERM_SUFFIX: &str = "termSuffix";

const PROPS: &[&str] = &[COUNT, ELEM_FIXED_LENGTH];
const POSSIBLE: &[&str] = &[ELEMENT, COUNT_PREFIX, LENGTH_PREFIX, ELEM_LENGTH_PREFIX, TERM_SUFFIX];

#[derive(Debug, Clone, Default)]
pub struct ListField {
    pub element: InnerField,
    pub count: usize,
    pub count_prefix: Prefix,
    pub length_prefix: Prefix,
    pub elem_length_prefix: Prefix,
    pub elem_fixed_length: bool,
    pub term_suffix: Prefix,
}

impl ListField {
    pub fn element_field<'a>(&'a self, reg: &'a Registry) -> Option<&'a Field> {
        self.element.field(reg)
    }

    fn elem_min_length(&self, reg: &Registry) -> usize {
        self.element_field(reg).map(|f| f.min_length(reg)).unwrap_or(0)
    }

    fn elem_max_length(&self, reg: &Registry) -> usize {
        self.element_field(reg).map(|f| f.max_length(reg)).unwrap_or(0)
    }

    fn update_element(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let from_prop = p.single(ELEMENT)?;
        if let Some(reference) = &from_prop {
            let Some(id) = p.ctx.find_field_id(reference) else {
                return Err(p.error(format!(
                    "Cannot find field referenced by \"{}\" property ({}).",
                    ELEMENT, reference
                )));
            };
            self.element = InnerField::External(id);
        }

        if let Some(node) = inline_field_node(p, ELEMENT, from_prop.is_some())? {
            let ctx = p.member_ctx(Kind::List, common.versions);
            self.element = InnerField::Local(Box::new(Field::create(node, ctx)?));
        }

        if matches!(self.element, InnerField::Missing) {
            return Err(p.error("List element hasn't been provided."));
        }
        Ok(())
    }

    fn has_sequence_limit(&self) -> bool {
        !self.count_prefix.is_none() || !self.length_prefix.is_none() || !self.term_suffix.is_none()
    }

    fn update_count(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(COUNT)? else {
            return Ok(());
        };
        let count = common::str_to_usize(&v)
            .filter(|c| *c != 0)
            .ok_or_else(|| p.unexpected(COUNT, &v))?;
        if self.has_sequence_limit() || self.elem_length_prefix.detached().is_some() {
            return Err(p.error(format!(
                "Cannot use {} property after reusing list with {}, {}, or {}.",
                COUNT, COUNT_PREFIX, LENGTH_PREFIX, TERM_SUFFIX
            )));
        }
        self.count = count;
        Ok(())
    }

    /// `this` and each of `others` that is present cannot be combined.
    fn exclusive(p: &KindParse<'_>, this: &str, others: &[(&str, bool)]) -> DslResult<()> {
        match others.iter().find(|(_, present)| *present) {
            Some((other, _)) => Err(p.error(format!("{} and {} cannot be used together.", other, this))),
            None => Ok(()),
        }
    }

    fn update_count_prefix(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        prefix::parse_prefix(p, common, Kind::List, COUNT_PREFIX, &mut self.count_prefix)?;
        if self.count_prefix.is_none() {
            return Ok(());
        }
        Self::exclusive(
            p,
            COUNT_PREFIX,
            &[
                (COUNT, self.count != 0),
                (LENGTH_PREFIX, !self.length_prefix.is_none()),
                (TERM_SUFFIX, !self.term_suffix.is_none()),
            ],
        )
    }

    fn update_length_prefix(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        prefix::parse_prefix(p, common, Kind::List, LENGTH_PREFIX, &mut self.length_prefix)?;
        if self.length_prefix.is_none() {
            return Ok(());
        }
        Self::exclusive(
            p,
            LENGTH_PREFIX,
            &[
                (COUNT, self.count != 0),
                (COUNT_PREFIX, !self.count_prefix.is_none()),
                (TERM_SUFFIX, !self.term_suffix.is_none()),
            ],
        )
    }

    fn update_elem_fixed_length(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(ELEM_FIXED_LENGTH)? {
            self.elem_fixed_length =
                common::str_to_bool(&v).ok_or_else(|| p.unexpected(ELEM_FIXED_LENGTH, &v))?;
        }
        if !self.elem_fixed_length {
            return Ok(());
        }
        let reg = p.ctx.registry;
        if self.elem_min_length(reg) != self.elem_max_length(reg) {
            return Err(p.error(format!(
                "Cannot have \"{}\" property being set to true when list element has variable length.",
                ELEM_FIXED_LENGTH
            )));
        }
        Ok(())
    }

    fn update_elem_length_prefix(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        prefix::parse_prefix(p, common, Kind::List, ELEM_LENGTH_PREFIX, &mut self.elem_length_prefix)?;
        if self.elem_length_prefix.detached().is_some() && !self.elem_fixed_length {
            return Err(p.error(format!(
                "Detached element length prefix is supported only for lists with fixed length elements. Set the \"{}\" property.",
                ELEM_FIXED_LENGTH
            )));
        }
        Ok(())
    }

    fn update_term_suffix(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        prefix::parse_prefix(p, common, Kind::List, TERM_SUFFIX, &mut self.term_suffix)?;
        if self.term_suffix.is_none() {
            return Ok(());
        }
        if !p.ctx.schema_props().property_supported(TERM_SUFFIX) {
            p.warn(format!(
                "Usage of the {} property is not supported for the used dslVersion, ignoring...",
                TERM_SUFFIX
            ));
            self.term_suffix = Prefix::None;
            return Ok(());
        }
        Self::exclusive(
            p,
            TERM_SUFFIX,
            &[
                (COUNT, self.count != 0),
                (COUNT_PREFIX, !self.count_prefix.is_none()),
                (LENGTH_PREFIX, !self.length_prefix.is_none()),
            ],
        )
    }
}

impl FieldImpl for ListField {
    fn kind(&self) -> Kind {
        Kind::List
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn possible_props(&self) -> &'static [&'static str] {
        POSSIBLE
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[
            ELEMENT,
            COUNT_PREFIX,
            LENGTH_PREFIX,
            ELEM_LENGTH_PREFIX,
            TERM_SUFFIX,
            "int",
            "enum",
            "set",
            "data",
            "string",
            "bitfield",
            "bundle",
            "list",
            "ref",
            "optional",
            "variant",
        ]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.update_element(common, p)?;
        self.update_count(p)?;
        self.update_count_prefix(common, p)?;
        self.update_length_prefix(common, p)?;
        self.update_elem_fixed_length(p)?;
        self.update_elem_length_prefix(common, p)?;
        self.update_term_suffix(common, p)
    }

    fn min_length(&self, reg: &Registry) -> usize {
        let mut extra = self.elem_length_prefix.min_length(reg);
        if self.count != 0 {
            if !self.elem_fixed_length {
                extra = common::mul_length(extra, self.count);
            }
            return common::add_length(common::mul_length(self.elem_min_length(reg), self.count), extra);
        }
        if self.count_prefix.has_field() {
            return self.count_prefix.min_length(reg);
        }
        if self.length_prefix.has_field() {
            return self.length_prefix.min_length(reg);
        }
        self.term_suffix.min_length(reg)
    }

    fn max_length(&self, reg: &Registry) -> usize {
        let mut extra = self.elem_length_prefix.max_length(reg);
        let elem_max = self.elem_max_length(reg);
        if self.count != 0 {
            if !self.elem_fixed_length {
                extra = common::mul_length(extra, self.count);
            }
            return common::add_length(common::mul_length(elem_max, self.count), extra);
        }
        if self.count_prefix.has_field() {
            let Some(count) = self.count_prefix.max_value(reg) else {
                return common::MAX_POSSIBLE_LENGTH;
            };
            let mut result = common::mul_length(elem_max, count);
            result = common::add_length(result, self.count_prefix.max_length(reg));
            if !self.elem_fixed_length {
                extra = common::mul_length(extra, count);
            }
            return common::add_length(result, extra);
        }
        if self.length_prefix.has_field() {
            if let Some(span) = self.length_prefix.max_span(reg) {
                return span;
            }
        }
        common::MAX_POSSIBLE_LENGTH
    }

    fn valid_ref_type(&self, ty: FieldRefType, _reg: &Registry) -> bool {
        ty == FieldRefType::Size
    }

    fn verify_siblings(&self, common: &FieldCommon, siblings: &[Field], ctx: &ParseCtx<'_>) -> DslResult<()> {
        prefix::verify_detached(common, &self.count_prefix, siblings, ctx)?;
        prefix::verify_detached(common, &self.length_prefix, siblings, ctx)?;
        prefix::verify_detached(common, &self.elem_length_prefix, siblings, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_without_limit_is_unbounded() {
        let reg = Registry::default();
        let l = ListField::default();
        assert_eq!(l.min_length(&reg), 0);
        assert_eq!(l.max_length(&reg), common::MAX_POSSIBLE_LENGTH);
    }

    #[test]
    fn detached_count_prefix_adds_no_length() {
        let reg = Registry::default();
        let l = ListField {
            count_prefix: Prefix::Detached("count".to_string()),
            ..ListField::default()
        };
        assert_eq!(l.min_length(&reg), 0);
        assert_eq!(l.max_length(&reg), common::MAX_POSSIBLE_LENGTH);
    }
}
