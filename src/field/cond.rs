//! Presence and validity conditions.
//!
//! A condition is either a single comparison (`$a = 5`, `$a.b != $c`,
//! `%ifaceField >= 2`, `$#list > 0`), a bit or existence check (`$flags.bit`,
//! `!$?opt`), or an `and`/`or` bundle of at least two nested conditions.

use crate::common::{INTERFACE_REF_PREFIX, SIBLING_REF_PREFIX};
use crate::error::DslResult;
use crate::props;
use crate::registry::ParseCtx;
use crate::schema::Feature;
use crate::xml::{SrcPos, XmlNode};

use super::{process_sibling_ref, Field, FieldKind, FieldRefInfo, FieldRefType, Kind, KindParse};

pub const COND: &str = "cond";
pub const AND: &str = "and";
pub const OR: &str = "or";

const ESC: char = '\\';
const OPERATORS: [&str; 6] = ["!=", ">=", "<=", "=", ">", "<"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    Invalid,
    Value,
    SiblingRef,
    InterfaceRef,
}

/// How an operand dereferences its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Value,
    Size,
    Exists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operand<'a> {
    pub ty: OperandType,
    pub mode: AccessMode,
    /// Operand text without the dereference and access prefixes.
    pub access: &'a str,
}

impl<'a> Operand<'a> {
    pub fn parse(val: &'a str) -> Operand<'a> {
        let invalid = Operand {
            ty: OperandType::Invalid,
            mode: AccessMode::Value,
            access: "",
        };
        let mut chars = val.chars();
        let ty = match chars.next() {
            None => return invalid,
            Some(SIBLING_REF_PREFIX) => OperandType::SiblingRef,
            Some(INTERFACE_REF_PREFIX) => OperandType::InterfaceRef,
            Some(_) => {
                return Operand {
                    ty: OperandType::Value,
                    mode: AccessMode::Value,
                    access: val,
                }
            }
        };
        let rest = &val[1..];
        let (mode, access) = if let Some(r) = rest.strip_prefix('#') {
            (AccessMode::Size, r)
        } else if let Some(r) = rest.strip_prefix('?') {
            (AccessMode::Exists, r)
        } else {
            (AccessMode::Value, rest)
        };
        Operand { ty, mode, access }
    }
}

/// Single comparison or check. `left` is empty for checks; `op` is empty for a
/// plain check and `!` for a negated one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CondExpr {
    pub left: String,
    pub op: String,
    pub right: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondListType {
    And,
    Or,
}

impl CondListType {
    pub fn as_str(self) -> &'static str {
        match self {
            CondListType::And => AND,
            CondListType::Or => OR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    Expr(CondExpr),
    List(CondListType, Vec<Cond>),
}

fn interface_refs_supported(node: &XmlNode, ctx: &ParseCtx<'_>) -> DslResult<()> {
    if ctx.supports(Feature::InterfaceFieldReference) {
        return Ok(());
    }
    Err(props::semantic(
        ctx.logger,
        &node.pos,
        "References to the interface fields are not supported in the selected dslVersion.",
    ))
}

impl CondExpr {
    /// Parse a textual condition; `prop` names the property for diagnostics.
    pub fn parse(expr: &str, prop: &str, node: &XmlNode, ctx: &ParseCtx<'_>) -> DslResult<CondExpr> {
        let expr = expr.trim();
        let invalid = || {
            props::semantic(
                ctx.logger,
                &node.pos,
                format!("The \"{}\" string is not valid condition expression.", expr),
            )
        };
        if expr.is_empty() {
            return Err(props::semantic(ctx.logger, &node.pos, "Invalid condition expression"));
        }

        for op in OPERATORS {
            let Some(pos) = find_unescaped(expr, op) else {
                continue;
            };
            if pos == 0 {
                return Err(invalid());
            }
            let left = expr[..pos].trim_end();
            let right = expr[pos + op.len()..].trim_start();
            if left.is_empty() || right.is_empty() {
                return Err(invalid());
            }
            if left.starts_with(INTERFACE_REF_PREFIX) {
                interface_refs_supported(node, ctx)?;
            } else if !left.starts_with(SIBLING_REF_PREFIX) {
                return Err(props::semantic(
                    ctx.logger,
                    &node.pos,
                    format!(
                        "Invalid \"{}\" expression, left side of comparison operator must dereference other field.",
                        prop
                    ),
                ));
            }
            return Ok(CondExpr {
                left: left.to_string(),
                op: op.to_string(),
                right: right.to_string(),
            });
        }

        if expr.starts_with(SIBLING_REF_PREFIX) || expr.starts_with(INTERFACE_REF_PREFIX) {
            if expr.starts_with(INTERFACE_REF_PREFIX) {
                interface_refs_supported(node, ctx)?;
            }
            return Ok(CondExpr {
                right: expr.to_string(),
                ..CondExpr::default()
            });
        }
        let Some(negated) = expr.strip_prefix('!') else {
            return Err(invalid());
        };
        let negated = negated.trim_start();
        if negated.is_empty() {
            return Err(invalid());
        }
        if negated.starts_with(INTERFACE_REF_PREFIX) {
            interface_refs_supported(node, ctx)?;
        } else if !negated.starts_with(SIBLING_REF_PREFIX) {
            return Err(props::semantic(
                ctx.logger,
                &node.pos,
                format!(
                    "Invalid \"{}\" expression, the check must dereference other field.",
                    prop
                ),
            ));
        }
        Ok(CondExpr {
            left: String::new(),
            op: "!".to_string(),
            right: negated.to_string(),
        })
    }

    pub fn left_operand(&self) -> Operand<'_> {
        Operand::parse(&self.left)
    }

    pub fn right_operand(&self) -> Operand<'_> {
        Operand::parse(&self.right)
    }

    pub fn has_interface_reference(&self) -> bool {
        self.left.starts_with(INTERFACE_REF_PREFIX) || self.right.starts_with(INTERFACE_REF_PREFIX)
    }

    fn verify(&self, fields: &[Field], pos: &SrcPos, ctx: &ParseCtx<'_>) -> DslResult<()> {
        let fail = |msg: String| -> DslResult<()> { Err(props::semantic(ctx.logger, pos, msg)) };
        let reg = ctx.registry;

        if self.left.is_empty() {
            if let Some(reference) = self.right.strip_prefix(SIBLING_REF_PREFIX) {
                let info = process_sibling_ref(fields, reference, reg);
                let invalid = || fail(format!("The \"{}\" string is invalid sibling reference.", self.right));
                if info.field.is_none() {
                    return invalid();
                }
                match info.ref_type {
                    FieldRefType::InnerValue => return Ok(()),
                    FieldRefType::Exists => {}
                    _ => return invalid(),
                }
                if !ctx.supports(Feature::ExistsCheckInConditionals) {
                    return fail(
                        "The optional mode check in the optional condition is not supported for the selected DSL version."
                            .to_string(),
                    );
                }
                return Ok(());
            }
            let reference = &self.right[1..];
            let found = interface_field_refs(reference, ctx);
            let valid = found.iter().any(|info| {
                info.ref_type == FieldRefType::InnerValue
                    && info.field.map(|f| f.non_ref(reg).kind()) == Some(Kind::Set)
            });
            if valid {
                return Ok(());
            }
            return fail(format!(
                "The \"{}\" string is expected to dereference existing bit in existing <set> field or <ref> to it in one of the <interface>-es.",
                self.right
            ));
        }

        let left_fields: Vec<FieldRefInfo<'_>> = match self.left.strip_prefix(SIBLING_REF_PREFIX) {
            Some(reference) => {
                let info = process_sibling_ref(fields, reference, reg);
                if info.field.is_none() {
                    return fail(format!(
                        "The \"{}\" string is expected to dereference existing sibling field.",
                        self.left
                    ));
                }
                vec![info]
            }
            None => interface_field_refs(&self.left[1..], ctx),
        };

        if left_fields.iter().any(|i| i.ref_type == FieldRefType::Size) {
            if !ctx.supports(Feature::SizeCompInConditionals) {
                return fail(
                    "The size comparison check in the optional condition is not supported for the selected DSL version."
                        .to_string(),
                );
            }
            if self.right.parse::<i64>().is_err() {
                return fail(format!(
                    "The dereferenced fields \"{}\" cannot be compared to value \"{}\".",
                    self.left, self.right
                ));
            }
            return Ok(());
        }

        let left: Vec<&Field> = left_fields
            .iter()
            .filter(|i| i.ref_type == FieldRefType::Field)
            .filter_map(|i| i.field)
            .collect();
        if left.is_empty() {
            if self.left.starts_with(SIBLING_REF_PREFIX) {
                return fail(format!(
                    "The \"{}\" string is expected to dereference existing sibling field.",
                    self.left
                ));
            }
            return fail(format!(
                "The \"{}\" is not valid field dereference expression for this condition.",
                self.left
            ));
        }

        let right: Vec<&Field> = if let Some(reference) = self.right.strip_prefix(SIBLING_REF_PREFIX) {
            let info = process_sibling_ref(fields, reference, reg);
            match info.field {
                Some(f) if info.ref_type == FieldRefType::Field => vec![f],
                _ => {
                    return fail(format!(
                        "The \"{}\" string is expected to dereference existing sibling field.",
                        self.right
                    ))
                }
            }
        } else if let Some(reference) = self.right.strip_prefix(INTERFACE_REF_PREFIX) {
            let found: Vec<&Field> = interface_field_refs(reference, ctx)
                .into_iter()
                .filter(|i| i.ref_type == FieldRefType::Field)
                .filter_map(|i| i.field)
                .collect();
            if found.is_empty() {
                return fail(format!(
                    "The \"{}\" is not valid field dereference expression for this condition.",
                    self.right
                ));
            }
            found
        } else {
            let comparable = left.iter().any(|f| f.is_comparable_to_value(&self.right, ctx));
            if !comparable {
                return fail(format!(
                    "The dereferenced fields \"{}\" cannot be compared to value \"{}\".",
                    self.left, self.right
                ));
            }
            return Ok(());
        };

        let comparable = left
            .iter()
            .any(|l| right.iter().any(|r| l.is_comparable_to_field(r, reg)));
        if !comparable {
            return fail(format!(
                "Two dereferenced fields \"{}\" and \"{}\" cannot be compared.",
                self.left, self.right
            ));
        }
        Ok(())
    }
}

/// Position of the first `op` not preceded by an escape character.
fn find_unescaped(expr: &str, op: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = expr[from..].find(op) {
        let pos = from + rel;
        if pos == 0 || !expr[..pos].ends_with(ESC) {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

/// Resolve `reference` against the fields of every interface of the current
/// schema.
pub fn interface_field_refs<'a>(reference: &'a str, ctx: &ParseCtx<'a>) -> Vec<FieldRefInfo<'a>> {
    ctx.registry
        .interfaces_in(ctx.schema)
        .map(|iface| process_sibling_ref(&iface.fields, reference, ctx.registry))
        .filter(|info| info.is_valid())
        .collect()
}

impl Cond {
    /// Parse an `and`/`or` element.
    pub fn parse_list(node: &XmlNode, ctx: &ParseCtx<'_>) -> DslResult<Cond> {
        let ty = match node.name.as_str() {
            AND => CondListType::And,
            OR => CondListType::Or,
            other => {
                return Err(props::semantic(
                    ctx.logger,
                    &node.pos,
                    format!("Unknown condition type \"{}\".", other),
                ))
            }
        };
        let mut conds = Vec::new();
        for c in &node.children {
            if c.name == COND {
                let expr = props::node_value(c, ctx.logger)?;
                conds.push(Cond::Expr(CondExpr::parse(&expr, COND, c, ctx)?));
                continue;
            }
            if c.name != AND && c.name != OR {
                return Err(props::semantic(
                    ctx.logger,
                    &c.pos,
                    format!("Unknown element inside \"{}\" condition bundling", node.name),
                ));
            }
            conds.push(Cond::parse_list(c, ctx)?);
        }
        if conds.len() < 2 {
            return Err(props::semantic(
                ctx.logger,
                &node.pos,
                format!(
                    "Condition bundling element \"{}\" is expected to have at least 2 conditions.",
                    node.name
                ),
            ));
        }
        Ok(Cond::List(ty, conds))
    }

    /// Check every referenced field exists among `fields` (or interfaces) and
    /// can be compared the requested way.
    pub fn verify(&self, fields: &[Field], pos: &SrcPos, ctx: &ParseCtx<'_>) -> DslResult<()> {
        match self {
            Cond::Expr(e) => e.verify(fields, pos, ctx),
            Cond::List(_, conds) => conds.iter().try_for_each(|c| c.verify(fields, pos, ctx)),
        }
    }

    pub fn has_interface_reference(&self) -> bool {
        match self {
            Cond::Expr(e) => e.has_interface_reference(),
            Cond::List(_, conds) => conds.iter().any(Cond::has_interface_reference),
        }
    }
}

/// Read a condition written either as the `prop` property or as a `prop`
/// child holding a single `and`/`or` element.
pub(crate) fn parse_cond_prop(
    node: &XmlNode,
    prop: &str,
    single: Option<&str>,
    ctx: &ParseCtx<'_>,
) -> DslResult<Option<Cond>> {
    let multi: Vec<&XmlNode> = node
        .children_named(prop)
        .filter(|c| c.children.iter().any(|cc| cc.name == AND || cc.name == OR))
        .collect();
    if multi.is_empty() {
        return match single {
            Some(expr) => Ok(Some(Cond::Expr(CondExpr::parse(expr, prop, node, ctx)?))),
            None => Ok(None),
        };
    }
    if 1 < multi.len() {
        return Err(props::semantic(
            ctx.logger,
            &node.pos,
            format!("Cannot use more that one child to the \"{}\" element.", prop),
        ));
    }
    let holder = multi[0];
    if holder.children.len() != 1 {
        return Err(props::semantic(
            ctx.logger,
            &node.pos,
            format!(
                "Only single \"{}\" or \"{}\" child of the \"{}\" element is supported.",
                AND, OR, prop
            ),
        ));
    }
    if node.attr(prop).is_some() {
        return Err(props::semantic(
            ctx.logger,
            &holder.pos,
            format!("Only single \"{}\" property is supported", prop),
        ));
    }
    Cond::parse_list(&holder.children[0], ctx).map(Some)
}

pub const VALID_COND: &str = "validCond";
pub const COPY_VALID_COND_FROM: &str = "copyValidCondFrom";

fn valid_cond_of(field: &Field) -> Option<&Cond> {
    match &field.kind {
        FieldKind::Bitfield(b) => b.valid_cond.as_ref(),
        FieldKind::Bundle(b) => b.valid_cond.as_ref(),
        _ => None,
    }
}

/// `copyValidCondFrom` and `validCond` of composite fields, verified against
/// the field's own members.
pub(crate) fn update_valid_cond(
    p: &KindParse<'_>,
    kind: Kind,
    members: &[Field],
    current: &mut Option<Cond>,
) -> DslResult<()> {
    let node = p.node();
    let ctx = &p.ctx;
    if let Some(src) = p.single(COPY_VALID_COND_FROM)? {
        if p.property_supported(COPY_VALID_COND_FROM) {
            let Some(other) = ctx.find_field(&src) else {
                return Err(p.error(format!(
                    "Field referenced by \"{}\" property ({}) is not found.",
                    COPY_VALID_COND_FROM, src
                )));
            };
            if other.kind() != kind {
                return Err(p.error(format!(
                    "Cannot reference field of other cond in property \"{}\".",
                    COPY_VALID_COND_FROM
                )));
            }
            if current.is_some() {
                return Err(p.error(format!(
                    "Cannot use \"{}\" property when the validity condition is copied from other field by other means",
                    COPY_VALID_COND_FROM
                )));
            }
            match valid_cond_of(other) {
                None => p.warn(format!(
                    "Field referenced by the \"{}\" property ({}) does not specify any validity conditions",
                    COPY_VALID_COND_FROM, src
                )),
                Some(cond) => {
                    cond.verify(members, &node.pos, ctx)?;
                    *current = Some(cond.clone());
                }
            }
        }
    }

    let single = match node.children_named(VALID_COND).find(|c| c.children.is_empty()) {
        Some(c) => Some(props::node_value(c, p.logger())?),
        None => node.attr(VALID_COND).map(str::to_string),
    };
    let has_multi = node
        .children_named(VALID_COND)
        .any(|c| !c.children.is_empty());
    if single.is_none() && !has_multi {
        return Ok(());
    }
    if !p.supports(Feature::ValidCondInCompositeFields) {
        p.warn(format!(
            "The property \"{}\" is not supported for <{}> field in dslVersion={}.",
            VALID_COND,
            kind.as_str(),
            ctx.schema_props().dsl_version
        ));
        return Ok(());
    }
    let Some(cond) = parse_cond_prop(node, VALID_COND, single.as_deref(), ctx)? else {
        return Ok(());
    };
    if cond.has_interface_reference() {
        return Err(p.error(format!(
            "The condition \"{}\" in fields cannot reference interface fields.",
            VALID_COND
        )));
    }
    cond.verify(members, &node.pos, ctx)?;
    *current = Some(cond);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operands() {
        let o = Operand::parse("$#data");
        assert_eq!(o.ty, OperandType::SiblingRef);
        assert_eq!(o.mode, AccessMode::Size);
        assert_eq!(o.access, "data");

        let o = Operand::parse("%?flags");
        assert_eq!(o.ty, OperandType::InterfaceRef);
        assert_eq!(o.mode, AccessMode::Exists);

        let o = Operand::parse("5");
        assert_eq!(o.ty, OperandType::Value);
        assert_eq!(o.access, "5");

        assert_eq!(Operand::parse("").ty, OperandType::Invalid);
    }

    #[test]
    fn escaped_operator_is_skipped() {
        assert_eq!(find_unescaped("$a = 1", "="), Some(3));
        assert_eq!(find_unescaped("$a \\= 1", "="), None);
        assert_eq!(find_unescaped("$a \\=b = 1", "="), Some(7));
        assert_eq!(find_unescaped("$a \\=\\= 1", "="), None);
        assert_eq!(find_unescaped("\\=$a \\= 1 = 2", "="), Some(10));
        assert_eq!(find_unescaped("$a > 1", ">="), None);
    }
}
