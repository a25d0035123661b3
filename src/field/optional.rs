//! `optional` fields: a field that may be missing, either by default mode or
//! depending on a condition over its siblings.

use crate::common;
use crate::error::DslResult;
use crate::registry::{ParseCtx, Parent, Registry};
use crate::xml::XmlNode;

use super::cond::{Cond, CondExpr, AND, COND, OR};
use super::{
    inline_field_node, Field, FieldCommon, FieldImpl, FieldRefInfo, FieldRefType, InnerField, Kind,
    KindParse,
};

pub const DEFAULT_MODE: &str = "defaultMode";
pub const DISPLAY_EXT_MODE_CTRL: &str = "displayExtModeCtrl";
pub const MISSING_ON_READ_FAIL: &str = "missingOnReadFail";
pub const MISSING_ON_INVALID: &str = "missingOnInvalid";
pub const FIELD: &str = "field";

const PROPS: &[&str] = &[
    DEFAULT_MODE,
    COND,
    DISPLAY_EXT_MODE_CTRL,
    MISSING_ON_READ_FAIL,
    MISSING_ON_INVALID,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionalMode {
    #[default]
    Tentative,
    Missing,
    Exists,
}

impl OptionalMode {
    pub fn parse(value: &str) -> Option<OptionalMode> {
        match value.to_ascii_lowercase().as_str() {
            "t" | "tent" | "tentative" => Some(OptionalMode::Tentative),
            "m" | "miss" | "missing" => Some(OptionalMode::Missing),
            "e" | "exist" | "exists" => Some(OptionalMode::Exists),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptionalMode::Tentative => "tentative",
            OptionalMode::Missing => "missing",
            OptionalMode::Exists => "exists",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OptionalField {
    pub field: InnerField,
    pub mode: OptionalMode,
    pub cond: Option<Cond>,
    pub missing_on_read_fail: bool,
    pub missing_on_invalid: bool,
    pub display_ext_mode_ctrl: bool,
}

impl OptionalField {
    pub fn inner<'a>(&'a self, reg: &'a Registry) -> Option<&'a Field> {
        self.field.field(reg)
    }

    /// Wrapped field when `rest` starts with its name, plus the remainder.
    fn named_inner<'a, 'r>(&'a self, rest: &'r str, reg: &'a Registry) -> Option<(&'a Field, &'r str)> {
        let field = self.inner(reg)?;
        let (first, tail) = common::split_first(rest);
        (field.name() == first).then_some((field, tail))
    }

    fn update_flags(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(DEFAULT_MODE)? {
            self.mode = OptionalMode::parse(&v).ok_or_else(|| p.unexpected(DEFAULT_MODE, &v))?;
        }
        p.check_deprecated(DISPLAY_EXT_MODE_CTRL);
        if let Some(b) = p.bool_prop(DISPLAY_EXT_MODE_CTRL)? {
            self.display_ext_mode_ctrl = b;
        }
        if let Some(b) = p.bool_prop(MISSING_ON_READ_FAIL)? {
            self.missing_on_read_fail = b;
        }
        if let Some(b) = p.bool_prop(MISSING_ON_INVALID)? {
            self.missing_on_invalid = b;
        }
        Ok(())
    }

    fn update_field(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
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
        if let Some(node) = inline_field_node(p, FIELD, from_prop.is_some())? {
            let ctx = p.member_ctx(Kind::Optional, common.versions);
            self.field = InnerField::Local(Box::new(Field::create(node, ctx)?));
        }
        if self.field.is_missing() {
            return Err(p.error("Field itself hasn't been provided."));
        }
        Ok(())
    }

    fn update_cond(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let single = p.single(COND)?;
        if let Some(expr) = &single {
            if !matches!(p.ctx.parent, Parent::Message | Parent::Field(Kind::Bundle)) {
                return Err(p.error(
                    "Condition for existing mode are applicable only to members of \"bundle\" and \"message\".",
                ));
            }
            self.cond = Some(Cond::Expr(CondExpr::parse(expr, COND, p.node(), &p.ctx)?));
        }

        let multi: Vec<&XmlNode> = p
            .node()
            .children
            .iter()
            .filter(|c| c.name == AND || c.name == OR)
            .collect();
        let Some(first) = multi.first() else {
            return Ok(());
        };
        if single.is_some() {
            return Err(p.error_at(
                first,
                format!(
                    "Cannot use \"{}\" condition bundling together with \"{}\" property.",
                    first.name, COND
                ),
            ));
        }
        if 1 < multi.len() {
            return Err(p.error_at(
                first,
                format!("Cannot use more that one \"{}\" or \"{}\" element.", AND, OR),
            ));
        }
        self.cond = Some(Cond::parse_list(first, &p.ctx)?);
        Ok(())
    }
}

impl FieldImpl for OptionalField {
    fn kind(&self) -> Kind {
        Kind::Optional
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn possible_props(&self) -> &'static [&'static str] {
        &[FIELD]
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[
            FIELD, AND, OR, "int", "enum", "set", "data", "string", "bitfield", "bundle", "list",
            "ref", "optional", "variant",
        ]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.update_flags(p)?;
        self.update_field(common, p)?;
        self.update_cond(p)
    }

    /// A missing field occupies nothing.
    fn min_length(&self, _reg: &Registry) -> usize {
        0
    }

    fn max_length(&self, reg: &Registry) -> usize {
        self.inner(reg).map(|f| f.max_length(reg)).unwrap_or(0)
    }

    fn str_to_numeric(&self, rest: &str, reg: &Registry) -> Option<i128> {
        let (f, tail) = self.named_inner(rest, reg)?;
        f.str_to_numeric(tail, reg)
    }

    fn str_to_bool(&self, rest: &str, reg: &Registry) -> Option<bool> {
        let (f, tail) = self.named_inner(rest, reg)?;
        f.str_to_bool(tail, reg)
    }

    fn str_to_string(&self, rest: &str, reg: &Registry) -> Option<String> {
        let (f, tail) = self.named_inner(rest, reg)?;
        f.str_to_string(tail, reg)
    }

    fn str_to_data(&self, rest: &str, reg: &Registry) -> Option<Vec<u8>> {
        let (f, tail) = self.named_inner(rest, reg)?;
        f.str_to_data(tail, reg)
    }

    fn inner_ref<'a>(&'a self, _this: &'a Field, rest: &'a str, reg: &'a Registry) -> FieldRefInfo<'a> {
        match self.named_inner(rest, reg) {
            Some((f, tail)) => f.process_inner_ref(tail, reg),
            None => FieldRefInfo::invalid(),
        }
    }

    fn valid_ref_type(&self, ty: FieldRefType, _reg: &Registry) -> bool {
        ty == FieldRefType::Exists
    }

    fn verify_siblings(&self, common: &FieldCommon, siblings: &[Field], ctx: &ParseCtx<'_>) -> DslResult<()> {
        match &self.cond {
            Some(cond) => cond.verify(siblings, &common.pos, ctx),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_short_forms() {
        assert_eq!(OptionalMode::parse("T"), Some(OptionalMode::Tentative));
        assert_eq!(OptionalMode::parse("miss"), Some(OptionalMode::Missing));
        assert_eq!(OptionalMode::parse("Exist"), Some(OptionalMode::Exists));
        assert_eq!(OptionalMode::parse("maybe"), None);
    }

    #[test]
    fn optional_may_occupy_nothing() {
        let reg = Registry::default();
        let o = OptionalField::default();
        assert_eq!(o.min_length(&reg), 0);
        assert_eq!(o.max_length(&reg), 0);
    }
}
