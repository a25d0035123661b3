//! `alias` elements: alternative names for (nested) member fields of
//! bundles, messages and interfaces.

use crate::common::{self, SIBLING_REF_PREFIX};
use crate::error::DslResult;
use crate::field::Field;
use crate::props::{self, Extra, Props};
use crate::registry::ParseCtx;
use crate::schema::Feature;
use crate::xml::{SrcPos, XmlNode};

pub const ALIAS: &str = "alias";
pub const FIELD: &str = "field";

const PROPS: &[&str] = &[props::NAME, props::DESCRIPTION, FIELD];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    pub name: String,
    pub description: String,
    /// Dotted path of the aliased member, without the `$` prefix.
    pub field_name: String,
    pub extra: Extra,
    pub pos: SrcPos,
}

/// Names equal up to the case of their first letter.
fn same_name(a: &str, b: &str) -> bool {
    let mut ac = a.chars();
    let mut bc = b.chars();
    match (ac.next(), bc.next()) {
        (Some(x), Some(y)) => x.to_ascii_lowercase() == y.to_ascii_lowercase() && ac.eq(bc),
        (None, None) => true,
        _ => false,
    }
}

/// True when `path` walks through existing members of `fields`.
pub fn member_path_exists(fields: &[Field], path: &str) -> bool {
    let (first, rest) = common::split_first(path);
    let Some(f) = fields.iter().find(|f| f.name() == first) else {
        return false;
    };
    rest.is_empty() || member_path_exists(f.members(), rest)
}

impl Alias {
    pub fn parse(node: &XmlNode, ctx: &ParseCtx<'_>) -> DslResult<Alias> {
        let logger = ctx.logger;
        let p = Props::new(node, PROPS);

        let name = p.required(props::NAME, logger)?;
        if !common::is_valid_name(&name) {
            return Err(props::unexpected_value(logger, node, props::NAME, &name));
        }

        let description = match p.single(props::DESCRIPTION, logger)? {
            Some(v) => ctx
                .str_to_string_value(&v)
                .ok_or_else(|| props::unexpected_value(logger, node, props::DESCRIPTION, &v))?,
            None => String::new(),
        };

        let field = p.required(FIELD, logger)?;
        let field_name = match field.strip_prefix(SIBLING_REF_PREFIX) {
            Some(rest) if common::is_valid_ref_name(rest) => rest.to_string(),
            _ => return Err(props::unexpected_value(logger, node, FIELD, &field)),
        };

        let extra = p.check_unknown(&[PROPS], PROPS, logger)?;
        Ok(Alias {
            name,
            description,
            field_name,
            extra,
            pos: node.pos.clone(),
        })
    }

    /// Check against the aliases defined before this one and the members of
    /// the holding element.
    pub fn verify(&self, aliases: &[Alias], fields: &[Field], ctx: &ParseCtx<'_>) -> DslResult<()> {
        let fail = |msg: String| Err(props::semantic(ctx.logger, &self.pos, msg));
        if fields.iter().any(|f| same_name(f.name(), &self.name)) {
            return fail(format!(
                "Cannot create alias with name \"{}\", because field with the same name has been already defined.",
                self.name
            ));
        }
        if aliases.iter().any(|a| same_name(&a.name, &self.name)) {
            return fail(format!(
                "Cannot create alias with name \"{}\", because other alias with the same name has been already defined.",
                self.name
            ));
        }
        if !member_path_exists(fields, &self.field_name) {
            return fail(format!(
                "Aliased field(s) with name \"{}\", hasn't been found.",
                self.field_name
            ));
        }
        Ok(())
    }
}

/// Keep the inherited aliases whose target still exists, then add the
/// `<alias>` children of `node`.
pub(crate) fn update_aliases(
    node: &XmlNode,
    ctx: &ParseCtx<'_>,
    inherited: Vec<Alias>,
    fields: &[Field],
) -> DslResult<Vec<Alias>> {
    let mut aliases: Vec<Alias> = inherited
        .into_iter()
        .filter(|a| member_path_exists(fields, &a.field_name))
        .collect();

    let nodes: Vec<&XmlNode> = node.children_named(ALIAS).collect();
    let Some(first) = nodes.first() else {
        return Ok(aliases);
    };
    if !ctx.supports(Feature::FieldAlias) {
        return Err(props::semantic(
            ctx.logger,
            &first.pos,
            format!("Using \"{}\" nodes for too early \"dslVersion\".", ALIAS),
        ));
    }
    for n in nodes {
        let alias = Alias::parse(n, ctx)?;
        alias.verify(&aliases, fields, ctx)?;
        aliases.push(alias);
    }
    Ok(aliases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_letter_case_is_ignored() {
        assert!(same_name("value", "Value"));
        assert!(same_name("Value", "Value"));
        assert!(!same_name("value", "VAlue"));
        assert!(!same_name("val", "value"));
        assert!(same_name("", ""));
    }

    #[test]
    fn empty_member_list_has_no_paths() {
        assert!(!member_path_exists(&[], "a"));
        assert!(!member_path_exists(&[], "a.b"));
    }
}
