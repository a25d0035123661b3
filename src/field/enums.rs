//! `enum` fields.

use std::collections::BTreeMap;

use crate::common;
use crate::error::DslResult;
use crate::props::{self, Props};
use crate::registry::{ParseCtx, Registry};
use crate::version::VersionWindow;

use super::int::{IntLayout, BIT_LENGTH, DEFAULT_VALUE, ENDIAN, LENGTH, NAMED_VALUE_PROPS, TYPE, VAL, VALID_CHECK_VERSION};
use super::{Field, FieldCommon, FieldImpl, FieldRefInfo, FieldRefType, Kind, KindParse, SemanticType};

pub const NON_UNIQUE_ALLOWED: &str = "nonUniqueAllowed";
pub const HEX_ASSIGN: &str = "hexAssign";
pub const AVAILABLE_LENGTH_LIMIT: &str = "availableLengthLimit";
pub const VALID_VALUE: &str = "validValue";

const PROPS: &[&str] = &[
    TYPE,
    DEFAULT_VALUE,
    ENDIAN,
    LENGTH,
    BIT_LENGTH,
    NON_UNIQUE_ALLOWED,
    VALID_CHECK_VERSION,
    HEX_ASSIGN,
    AVAILABLE_LENGTH_LIMIT,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub value: i128,
    pub versions: VersionWindow,
    pub description: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumField {
    pub layout: IntLayout,
    pub default_value: i128,
    pub values: BTreeMap<String, EnumValue>,
    /// Names per numeric value, in declaration order.
    pub rev_values: BTreeMap<i128, Vec<String>>,
    pub non_unique_allowed: bool,
    pub valid_check_version: bool,
    pub hex_assign: bool,
    pub available_length_limit: bool,
}

impl EnumField {
    /// Every numeric value has a single name.
    pub fn is_unique(&self) -> bool {
        self.rev_values.values().all(|names| names.len() <= 1)
    }

    pub fn value_of(&self, s: &str, ctx: &ParseCtx<'_>) -> Option<i128> {
        self.layout
            .resolve(s, |n| self.values.get(n).map(|v| v.value), ctx)
            .ok()
            .flatten()
    }

    fn parse_value(&self, s: &str, p: &KindParse<'_>) -> DslResult<Option<i128>> {
        self.layout
            .resolve(s, |n| self.values.get(n).map(|v| v.value), &p.ctx)
            .map_err(|msg| p.error(msg))
    }

    fn update_values(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let logger = p.logger();
        let nodes: Vec<_> = p.node().children_named(VALID_VALUE).collect();
        if nodes.is_empty() {
            if !self.values.is_empty() {
                return Ok(());
            }
            return Err(p.error(format!(
                "The enum \"{}\" doesn't list any valid value.",
                common.name
            )));
        }

        for v in nodes {
            let vp = Props::new(v, NAMED_VALUE_PROPS);
            let name = vp.required(props::NAME, logger)?;
            let val = vp.required(VAL, logger)?;
            vp.check_unknown(&[NAMED_VALUE_PROPS], &[], logger)?;
            if !common::is_valid_name(&name) {
                return Err(p.error_at(
                    v,
                    format!("Property \"{}\" has unexpected value ({}).", props::NAME, name),
                ));
            }
            if self.values.contains_key(&name) {
                return Err(p.error_at(
                    v,
                    format!(
                        "Value with name \"{}\" has already been defined for enum \"{}\".",
                        name, common.name
                    ),
                ));
            }
            let Some(value) = self.parse_value(&val, p)? else {
                return Err(p.error_at(
                    v,
                    format!("Value of \"{}\" ({}) cannot be recognized.", name, val),
                ));
            };
            if !self.layout.in_type_range(value) {
                return Err(p.error_at(
                    v,
                    format!(
                        "Valid value \"{}\" is outside the range of available values within a type.",
                        name
                    ),
                ));
            }
            if !self.layout.in_serializable_range(value) {
                p.warn_at(
                    v,
                    format!(
                        "Valid value \"{}\" is outside the range of correctly serializable values.",
                        name
                    ),
                );
            }
            if !self.non_unique_allowed {
                if let Some(prev) = self.rev_values.get(&value).and_then(|n| n.first()) {
                    return Err(p.error_at(
                        v,
                        format!("Value \"{}\" has been already defined as \"{}\".", val, prev),
                    ));
                }
            }

            let versions = props::get_and_check_versions(
                &vp,
                common.versions,
                p.ctx.schema_props().version,
                logger,
            )?;
            let description = vp.single(props::DESCRIPTION, logger)?.unwrap_or_default();
            let display_name = match vp.single(props::DISPLAY_NAME, logger)? {
                Some(d) => p.ctx.str_to_string_value(&d).ok_or_else(|| {
                    props::unexpected_value(logger, v, props::DISPLAY_NAME, &d)
                })?,
                None => String::new(),
            };
            self.rev_values.entry(value).or_default().push(name.clone());
            self.values.insert(
                name,
                EnumValue {
                    value,
                    versions,
                    description,
                    display_name,
                },
            );
        }
        Ok(())
    }

    fn update_default(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(DEFAULT_VALUE)? else {
            return Ok(());
        };
        let Some(value) = self.parse_value(&v, p)? else {
            return Err(p.error(format!("Default value ({}) cannot be recognized.", v)));
        };
        if !self.layout.in_type_range(value) {
            return Err(p.error(format!(
                "The default value of the \"{}\" is not within type boundaries ({}).",
                common.name, v
            )));
        }
        if !self.layout.in_serializable_range(value) {
            p.warn(format!(
                "The default value of the \"{}\" is too small or big and will not be serialised correctly ({}).",
                common.name, v
            ));
        }
        self.default_value = value;
        Ok(())
    }
}

impl FieldImpl for EnumField {
    fn kind(&self) -> Kind {
        Kind::Enum
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[VALID_VALUE]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.layout.parse(common, p)?;
        if let Some(allowed) = p.bool_prop(NON_UNIQUE_ALLOWED)? {
            if self.non_unique_allowed && !allowed && !self.is_unique() {
                return Err(p.error(format!(
                    "Cannot clear \"{}\" property value while having multiple names for the same value.",
                    NON_UNIQUE_ALLOWED
                )));
            }
            self.non_unique_allowed = allowed;
        }
        if let Some(v) = p.bool_prop(VALID_CHECK_VERSION)? {
            self.valid_check_version = v;
        }
        self.update_values(common, p)?;
        self.update_default(common, p)?;
        if let Some(v) = p.bool_prop(HEX_ASSIGN)? {
            if v && !self.layout.ty.is_unsigned() {
                return Err(p.error(format!(
                    "Cannot set \"{}\" property with signed types.",
                    HEX_ASSIGN
                )));
            }
            self.hex_assign = v;
        }
        if let Some(v) = p.bool_prop(AVAILABLE_LENGTH_LIMIT)? {
            self.available_length_limit = v;
        }
        Ok(())
    }

    fn min_length(&self, _reg: &Registry) -> usize {
        self.layout.min_length()
    }

    fn max_length(&self, _reg: &Registry) -> usize {
        self.layout.length
    }

    fn bit_length(&self, common: &FieldCommon, _reg: &Registry) -> usize {
        if common.in_bitfield {
            self.layout.bit_length
        } else {
            0
        }
    }

    fn validate_bit_length(&self, bit_length: usize, _reg: &Registry) -> Result<(), String> {
        self.layout.validate_bit_length(bit_length)
    }

    fn str_to_numeric(&self, rest: &str, _reg: &Registry) -> Option<i128> {
        if rest.is_empty() {
            return Some(self.default_value);
        }
        self.values.get(rest).map(|v| v.value)
    }

    fn semantic_type_allowed(&self, ty: SemanticType, _ctx: &ParseCtx<'_>) -> bool {
        ty == SemanticType::MessageId
    }

    fn inner_ref<'a>(&'a self, this: &'a Field, rest: &'a str, _reg: &'a Registry) -> FieldRefInfo<'a> {
        if self.values.contains_key(rest) {
            return FieldRefInfo::inner_value(this, rest);
        }
        FieldRefInfo::invalid()
    }

    fn valid_ref_type(&self, ty: FieldRefType, _reg: &Registry) -> bool {
        ty == FieldRefType::InnerValue
    }

    fn comparable_to_value(&self, val: &str, ctx: &ParseCtx<'_>) -> bool {
        self.value_of(val, ctx).is_some()
    }

    fn comparable_to_field(&self, other: &Field, _reg: &Registry) -> bool {
        matches!(other.kind(), Kind::Int | Kind::Enum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniqueness_follows_reverse_map() {
        let mut e = EnumField::default();
        e.rev_values.insert(1, vec!["A".into()]);
        e.rev_values.insert(2, vec!["B".into()]);
        assert!(e.is_unique());
        e.rev_values.entry(2).or_default().push("C".into());
        assert!(!e.is_unique());
    }
}
