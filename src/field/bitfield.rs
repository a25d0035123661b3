//! `bitfield` fields: integral members packed into whole bytes.

use crate::common::{self, Endian};
use crate::error::DslResult;
use crate::registry::{ParseCtx, Registry};
use crate::schema::Feature;

use super::cond::{self, Cond, COPY_VALID_COND_FROM, VALID_COND};
use super::int::ENDIAN;
use super::{create_members, member_nodes, Field, FieldCommon, FieldImpl, Kind, KindParse, SemanticType};

/// Widest serialized bitfield.
pub const MAX_BITS: usize = 64;

const PROPS: &[&str] = &[ENDIAN, COPY_VALID_COND_FROM];
const MEMBER_KINDS: &[Kind] = &[Kind::Int, Kind::Enum, Kind::Set, Kind::Ref];

#[derive(Debug, Clone, Default)]
pub struct BitfieldField {
    pub endian: Endian,
    pub members: Vec<Field>,
    pub valid_cond: Option<Cond>,
}

impl BitfieldField {
    pub fn total_bits(&self, reg: &Registry) -> usize {
        self.members.iter().map(|m| m.bit_length(reg)).sum()
    }

    fn update_members(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        for m in &mut self.members {
            m.common.versions.since = m.common.versions.since.max(common.versions.since);
        }

        let nodes = member_nodes(p, MEMBER_KINDS)?;
        if nodes.is_empty() {
            if self.members.is_empty() {
                return Err(p.error("The \"bitfield\" must contain member fields."));
            }
            return Ok(());
        }
        if !self.members.is_empty() {
            return Err(p.error("The \"bitfield\" cannot add member fields after reuse."));
        }

        let ctx = p.member_ctx(Kind::Bitfield, common.versions);
        let members = create_members(nodes, ctx, Vec::new())?;
        for m in &members {
            if m.common.versions.since != common.versions.since
                || m.common.versions.deprecated != common.versions.deprecated
            {
                return Err(p.error_for(
                    m,
                    "Bitfield members are not allowed to update \"sinceVersion\" and \"deprecated\" properties.",
                ));
            }
        }
        self.members = members;

        let reg = p.ctx.registry;
        let total = self.total_bits(reg);
        if total % 8 != 0 {
            return Err(p.error(format!(
                "The summary of member's bit lengths ({}) is expected to be devisable by 8.",
                total
            )));
        }
        if MAX_BITS < total {
            return Err(p.error(format!(
                "The summary of member's bit lengths ({}) cannot be greater than {}.",
                total, MAX_BITS
            )));
        }
        Ok(())
    }
}

impl FieldImpl for BitfieldField {
    fn kind(&self) -> Kind {
        Kind::Bitfield
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn possible_props(&self) -> &'static [&'static str] {
        &[VALID_COND]
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[super::MEMBERS, "int", "enum", "set", "ref", VALID_COND]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        match p.single(ENDIAN)? {
            Some(v) => {
                self.endian = common::parse_endian(&v, p.ctx.schema_props().endian)
                    .ok_or_else(|| p.unexpected(ENDIAN, &v))?;
            }
            None if !p.reused => self.endian = p.ctx.schema_props().endian,
            None => {}
        }
        self.update_members(common, p)?;
        cond::update_valid_cond(p, Kind::Bitfield, &self.members, &mut self.valid_cond)
    }

    fn min_length(&self, reg: &Registry) -> usize {
        self.total_bits(reg) / 8
    }

    fn members(&self) -> &[Field] {
        &self.members
    }

    fn member_kinds(&self) -> &'static [Kind] {
        MEMBER_KINDS
    }

    fn replace_members(&mut self, members: Vec<Field>, p: &KindParse<'_>) -> DslResult<()> {
        for r in members {
            let Some(slot) = self.members.iter_mut().find(|m| m.name() == r.name()) else {
                return Err(p.error_for(
                    &r,
                    format!("Cannot find reused member with name \"{}\" to replace.", r.name()),
                ));
            };
            if r.common.versions.since != slot.common.versions.since
                || r.common.versions.deprecated != slot.common.versions.deprecated
            {
                return Err(p.error_for(
                    &r,
                    "Bitfield replacing members are not allowed to update \"sinceVersion\" and \"deprecated\" properties.",
                ));
            }
            *slot = r;
        }
        Ok(())
    }

    fn semantic_type_allowed(&self, ty: SemanticType, ctx: &ParseCtx<'_>) -> bool {
        ty == SemanticType::Length
            && ctx.supports(Feature::SemanticTypeLength)
            && ctx.supports(Feature::NonIntSemanticTypeLength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bitfield_is_zero_length() {
        let reg = Registry::default();
        let b = BitfieldField::default();
        assert_eq!(b.total_bits(&reg), 0);
        assert_eq!(b.min_length(&reg), 0);
    }
}
