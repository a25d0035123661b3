//! `bundle` fields: an ordered group of member fields serialized back to back.

use crate::alias::{self, Alias, ALIAS};
use crate::common;
use crate::error::DslResult;
use crate::registry::{ParseCtx, Registry};
use crate::schema::Feature;

use super::cond::{self, Cond, COPY_VALID_COND_FROM, VALID_COND};
use super::{
    create_members, member_nodes, replace_by_name, Field, FieldCommon, FieldImpl, Kind, KindParse,
    SemanticType, MEMBERS,
};

pub const REUSE_ALIASES: &str = "reuseAliases";

const PROPS: &[&str] = &[REUSE_ALIASES, COPY_VALID_COND_FROM];

#[derive(Debug, Clone, Default)]
pub struct BundleField {
    pub members: Vec<Field>,
    pub aliases: Vec<Alias>,
    pub valid_cond: Option<Cond>,
}

impl BundleField {
    fn update_members(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let since = common.versions.since;
        self.members
            .retain(|m| !(m.common.versions.removed && m.common.versions.deprecated <= since));
        for m in &mut self.members {
            m.common.versions.since = m.common.versions.since.max(since);
        }

        let nodes = member_nodes(p, &Kind::ALL)?;
        if nodes.is_empty() && self.members.is_empty() {
            return Err(p.error("The \"bundle\" must contain member fields."));
        }
        if !nodes.is_empty() {
            let ctx = p.member_ctx(Kind::Bundle, common.versions);
            self.members = create_members(nodes, ctx, std::mem::take(&mut self.members))?;
        }

        if !self.members.iter().any(|m| m.common.versions.since == since) {
            return Err(p.error(
                "There must be at least one member with the same version as the parent bundle.",
            ));
        }
        let lengths = self
            .members
            .iter()
            .filter(|m| m.semantic_type() == SemanticType::Length)
            .count();
        if 1 < lengths {
            return Err(p.error(
                "No more that single field with semantiType=\"length\" is allowed within \"bundle\".",
            ));
        }
        Ok(())
    }

    fn update_aliases(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let mut inherited = std::mem::take(&mut self.aliases);
        if p.reused {
            let keep = p.supports(Feature::FieldAlias) && p.bool_prop(REUSE_ALIASES)?.unwrap_or(true);
            if !keep {
                inherited.clear();
            }
        }
        self.aliases = alias::update_aliases(p.node(), &p.ctx, inherited, &self.members)?;
        Ok(())
    }
}

impl FieldImpl for BundleField {
    fn kind(&self) -> Kind {
        Kind::Bundle
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn possible_props(&self) -> &'static [&'static str] {
        &[VALID_COND]
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[
            MEMBERS, ALIAS, VALID_COND, "int", "enum", "set", "data", "string", "bitfield",
            "bundle", "list", "ref", "optional", "variant",
        ]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.update_members(common, p)?;
        self.update_aliases(p)?;
        cond::update_valid_cond(p, Kind::Bundle, &self.members, &mut self.valid_cond)
    }

    fn min_length(&self, reg: &Registry) -> usize {
        self.members
            .iter()
            .fold(0, |acc, m| common::add_length(acc, m.min_length(reg)))
    }

    /// Unbounded once a member carries the length of the rest.
    fn max_length(&self, reg: &Registry) -> usize {
        let mut sum = 0;
        for m in &self.members {
            if m.semantic_type() == SemanticType::Length {
                return common::MAX_POSSIBLE_LENGTH;
            }
            sum = common::add_length(sum, m.max_length(reg));
        }
        sum
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

    fn semantic_type_allowed(&self, ty: SemanticType, ctx: &ParseCtx<'_>) -> bool {
        ty == SemanticType::Length
            && ctx.supports(Feature::SemanticTypeLength)
            && ctx.supports(Feature::NonIntSemanticTypeLength)
    }
}
