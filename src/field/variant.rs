//! `variant` fields: exactly one of the member fields is present on the wire.

use crate::common;
use crate::error::DslResult;
use crate::registry::Registry;

use super::{
    member_nodes, replace_by_name, validate_member_names, Field, FieldCommon, FieldImpl, Kind,
    KindParse, MEMBERS,
};

pub const DEFAULT_MEMBER: &str = "defaultMember";
pub const DISPLAY_IDX_READ_ONLY_HIDDEN: &str = "displayIdxReadOnlyHidden";

const PROPS: &[&str] = &[DEFAULT_MEMBER, DISPLAY_IDX_READ_ONLY_HIDDEN];

#[derive(Debug, Clone, Default)]
pub struct VariantField {
    pub members: Vec<Field>,
    /// `None` when no member is selected by default.
    pub default_member: Option<usize>,
    pub display_idx_read_only_hidden: bool,
}

impl VariantField {
    pub fn default_member_field(&self) -> Option<&Field> {
        self.default_member.and_then(|idx| self.members.get(idx))
    }

    fn update_members(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let since = common.versions.since;
        self.members
            .retain(|m| !(m.common.versions.removed && m.common.versions.deprecated <= since));
        for m in &mut self.members {
            m.common.versions.since = m.common.versions.since.max(since);
        }

        let nodes = member_nodes(p, &Kind::ALL)?;
        if nodes.is_empty() && self.members.is_empty() {
            return Err(p.error("The \"variant\" must contain member fields."));
        }
        if !nodes.is_empty() {
            // Members are alternatives, none of them precedes another on the wire.
            let ctx = p.member_ctx(Kind::Variant, common.versions);
            let mut members = std::mem::take(&mut self.members);
            for node in nodes {
                members.push(Field::create(node, ctx)?);
            }
            validate_member_names(&members, p.logger())?;
            self.members = members;
        }

        if !self.members.iter().any(|m| m.common.versions.since == since) {
            return Err(p.error(
                "There must be at least one member with the same version as the parent variant.",
            ));
        }
        Ok(())
    }

    fn update_default_member(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(DEFAULT_MEMBER)? else {
            return Ok(());
        };
        if v.is_empty() {
            return Ok(());
        }
        if common::is_valid_name(&v) {
            let idx = self
                .members
                .iter()
                .position(|m| m.name() == v)
                .ok_or_else(|| p.unexpected(DEFAULT_MEMBER, &v))?;
            self.default_member = Some(idx);
            return Ok(());
        }

        let idx = if common::is_valid_ref_name(&v) {
            p.ctx.str_to_numeric(&v)
        } else {
            common::str_to_int(&v)
        }
        .ok_or_else(|| p.unexpected(DEFAULT_MEMBER, &v))?;
        if idx < 0 {
            self.default_member = None;
            return Ok(());
        }
        match usize::try_from(idx) {
            Ok(idx) if idx < self.members.len() => {
                self.default_member = Some(idx);
                Ok(())
            }
            _ => Err(p.unexpected(DEFAULT_MEMBER, &v)),
        }
    }
}

impl FieldImpl for VariantField {
    fn kind(&self) -> Kind {
        Kind::Variant
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[
            MEMBERS, "int", "enum", "set", "data", "string", "bitfield", "bundle", "list", "ref",
            "optional", "variant",
        ]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.update_members(common, p)?;
        self.update_default_member(p)?;
        p.check_deprecated(DISPLAY_IDX_READ_ONLY_HIDDEN);
        if let Some(b) = p.bool_prop(DISPLAY_IDX_READ_ONLY_HIDDEN)? {
            self.display_idx_read_only_hidden = b;
        }
        Ok(())
    }

    fn min_length(&self, _reg: &Registry) -> usize {
        0
    }

    /// Length of the longest alternative.
    fn max_length(&self, reg: &Registry) -> usize {
        let mut result = 0;
        for m in &self.members {
            let len = m.max_length(reg);
            if len == common::MAX_POSSIBLE_LENGTH {
                return len;
            }
            result = result.max(len);
        }
        result
    }

    fn members(&self) -> &[Field] {
        &self.members
    }

    fn member_kinds(&self) -> &'static [Kind] {
        &Kind::ALL
    }

    fn replace_members(&mut self, members: Vec<Field>, p: &KindParse<'_>) -> DslResult<()> {
        replace_by_name(&mut self.members, members, p.logger())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_variant_has_no_length() {
        let reg = Registry::default();
        let v = VariantField::default();
        assert_eq!(v.min_length(&reg), 0);
        assert_eq!(v.max_length(&reg), 0);
        assert!(v.default_member_field().is_none());
    }
}
