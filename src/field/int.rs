//! `int` fields.
//!
//! Values are held as `i128` so every `int64` and `uint64` value compares
//! directly; the type still decides which literals are accepted.

use std::collections::BTreeMap;

use crate::common::{self, Endian};
use crate::error::DslResult;
use crate::props::{self, Props, PropSource};
use crate::registry::{ParseCtx, Registry};
use crate::schema::Feature;
use crate::units::Units;
use crate::version::VersionWindow;

use super::{Field, FieldCommon, FieldImpl, FieldRefInfo, FieldRefType, Kind, KindParse, SemanticType};

pub const TYPE: &str = "type";
pub const DEFAULT_VALUE: &str = "defaultValue";
pub const UNITS: &str = "units";
pub const SCALING: &str = "scaling";
pub const ENDIAN: &str = "endian";
pub const LENGTH: &str = "length";
pub const BIT_LENGTH: &str = "bitLength";
pub const SER_OFFSET: &str = "serOffset";
pub const VALID_RANGE: &str = "validRange";
pub const VALID_VALUE: &str = "validValue";
pub const VALID_MIN: &str = "validMin";
pub const VALID_MAX: &str = "validMax";
pub const VALID_CHECK_VERSION: &str = "validCheckVersion";
pub const NON_UNIQUE_SPECIALS_ALLOWED: &str = "nonUniqueSpecialsAllowed";
pub const DISPLAY_DECIMALS: &str = "displayDecimals";
pub const DISPLAY_OFFSET: &str = "displayOffset";
pub const SIGN_EXT: &str = "signExt";
pub const DISPLAY_SPECIALS: &str = "displaySpecials";
pub const DEFAULT_VALID_VALUE: &str = "defaultValidValue";
pub const AVAILABLE_LENGTH_LIMIT: &str = "availableLengthLimit";
pub const SPECIAL: &str = "special";
pub const VAL: &str = "val";

const PROPS: &[&str] = &[
    TYPE,
    DEFAULT_VALUE,
    UNITS,
    SCALING,
    ENDIAN,
    LENGTH,
    BIT_LENGTH,
    SER_OFFSET,
    VALID_RANGE,
    VALID_VALUE,
    VALID_MIN,
    VALID_MAX,
    VALID_CHECK_VERSION,
    NON_UNIQUE_SPECIALS_ALLOWED,
    DISPLAY_DECIMALS,
    DISPLAY_OFFSET,
    SIGN_EXT,
    DISPLAY_SPECIALS,
    DEFAULT_VALID_VALUE,
    AVAILABLE_LENGTH_LIMIT,
];

/// Properties of a named value (`special` of an int, `validValue` of an enum).
pub(crate) const NAMED_VALUE_PROPS: &[&str] = &[
    props::NAME,
    VAL,
    props::SINCE_VERSION,
    props::DEPRECATED,
    props::DESCRIPTION,
    props::DISPLAY_NAME,
];

/// Serialization type of integral fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IntType {
    Int8,
    #[default]
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Intvar,
    Uintvar,
}

impl IntType {
    pub fn parse(value: &str) -> Option<IntType> {
        let t = match value.to_ascii_lowercase().as_str() {
            "int8" => IntType::Int8,
            "uint8" => IntType::Uint8,
            "int16" => IntType::Int16,
            "uint16" => IntType::Uint16,
            "int32" => IntType::Int32,
            "uint32" => IntType::Uint32,
            "int64" => IntType::Int64,
            "uint64" => IntType::Uint64,
            "intvar" => IntType::Intvar,
            "uintvar" => IntType::Uintvar,
            _ => return None,
        };
        Some(t)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntType::Int8 => "int8",
            IntType::Uint8 => "uint8",
            IntType::Int16 => "int16",
            IntType::Uint16 => "uint16",
            IntType::Int32 => "int32",
            IntType::Uint32 => "uint32",
            IntType::Int64 => "int64",
            IntType::Uint64 => "uint64",
            IntType::Intvar => "intvar",
            IntType::Uintvar => "uintvar",
        }
    }

    /// Bytes taken by the widest encoding.
    pub fn max_length(self) -> usize {
        match self {
            IntType::Int8 | IntType::Uint8 => 1,
            IntType::Int16 | IntType::Uint16 => 2,
            IntType::Int32 | IntType::Uint32 => 4,
            IntType::Int64 | IntType::Uint64 => 8,
            // 7 value bits per byte.
            IntType::Intvar | IntType::Uintvar => (64 - 1) / 7 + 1,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            IntType::Uint8 | IntType::Uint16 | IntType::Uint32 | IntType::Uint64 | IntType::Uintvar
        )
    }

    /// Values above `i64::MAX` are representable.
    pub fn is_big_unsigned(self) -> bool {
        matches!(self, IntType::Uint64 | IntType::Uintvar)
    }

    pub fn is_var_length(self) -> bool {
        matches!(self, IntType::Intvar | IntType::Uintvar)
    }

    pub fn min_value(self) -> i128 {
        match self {
            IntType::Int8 => i128::from(i8::MIN),
            IntType::Int16 => i128::from(i16::MIN),
            IntType::Int32 => i128::from(i32::MIN),
            IntType::Int64 | IntType::Intvar => i128::from(i64::MIN),
            _ => 0,
        }
    }

    pub fn max_value(self) -> i128 {
        match self {
            IntType::Int8 => i128::from(i8::MAX),
            IntType::Uint8 => i128::from(u8::MAX),
            IntType::Int16 => i128::from(i16::MAX),
            IntType::Uint16 => i128::from(u16::MAX),
            IntType::Int32 => i128::from(i32::MAX),
            IntType::Uint32 => i128::from(u32::MAX),
            IntType::Int64 | IntType::Intvar => i128::from(i64::MAX),
            IntType::Uint64 | IntType::Uintvar => i128::from(u64::MAX),
        }
    }

    /// Smallest value serializable in `bits` bits.
    pub fn calc_min_value(self, bits: usize) -> i128 {
        if self.is_unsigned() {
            return 0;
        }
        -self.calc_max_value(bits) - 1
    }

    /// Largest value serializable in `bits` bits.
    pub fn calc_max_value(self, bits: usize) -> i128 {
        let value_bits = if self.is_var_length() {
            ((bits / 8) * 7).min(64)
        } else {
            bits.min(64)
        };
        if value_bits == 0 {
            return 0;
        }
        if self.is_unsigned() {
            return (1i128 << value_bits) - 1;
        }
        (1i128 << (value_bits - 1)) - 1
    }
}

/// Type, byte order and lengths shared by `int` and `enum` fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntLayout {
    pub ty: IntType,
    pub endian: Endian,
    pub length: usize,
    /// Bits used inside a bitfield, `length * 8` elsewhere.
    pub bit_length: usize,
    pub type_min: i128,
    pub type_max: i128,
    /// Serializable bounds given `bit_length`.
    pub min_value: i128,
    pub max_value: i128,
}

impl IntLayout {
    /// Resolve `type`, `endian`, `length` and `bitLength`. On a reused field only
    /// `endian` may change.
    pub(crate) fn parse(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        match p.single(TYPE)? {
            Some(v) => {
                let ty = IntType::parse(&v).ok_or_else(|| p.unexpected(TYPE, &v))?;
                if p.reused && ty != self.ty {
                    return Err(p.error("Type cannot be changed after reuse"));
                }
                self.ty = ty;
            }
            None if !p.reused => {
                return Err(p.structural(format!(
                    "Missing value for mandatory property \"{}\" for \"{}\" element.",
                    TYPE,
                    p.node().name
                )));
            }
            None => {}
        }

        match p.single(ENDIAN)? {
            Some(v) => {
                self.endian = common::parse_endian(&v, p.ctx.schema_props().endian)
                    .ok_or_else(|| p.unexpected(ENDIAN, &v))?;
            }
            None if !p.reused => self.endian = p.ctx.schema_props().endian,
            None => {}
        }

        let max_length = self.ty.max_length();
        match p.single(LENGTH)? {
            Some(v) => {
                let len = common::str_to_usize(&v)
                    .filter(|l| *l != 0)
                    .ok_or_else(|| p.unexpected(LENGTH, &v))?;
                if self.length != len {
                    if p.reused {
                        return Err(p.error("Length cannot be changed after reuse"));
                    }
                    if max_length < len {
                        return Err(p.error(format!(
                            "Length of the \"{}\" element ({}) cannot exceed max length allowed by the type ({}).",
                            common.name, v, max_length
                        )));
                    }
                    self.length = len;
                }
            }
            None if !p.reused => self.length = max_length,
            None => {}
        }

        let max_bits = self.length * 8;
        match p.single(BIT_LENGTH)? {
            Some(_) if !common.in_bitfield => {
                p.warn(format!(
                    "The property \"{}\" is applicable only to the members of \"{}\"",
                    BIT_LENGTH,
                    Kind::Bitfield.as_str()
                ));
                self.bit_length = max_bits;
            }
            Some(v) => {
                let bits = common::str_to_usize(&v).ok_or_else(|| p.unexpected(BIT_LENGTH, &v))?;
                self.validate_bit_length(bits).map_err(|msg| p.error(msg))?;
                self.bit_length = bits;
            }
            None if self.bit_length == 0 || !p.reused => self.bit_length = max_bits,
            None => {}
        }

        self.type_min = self.ty.min_value();
        self.type_max = self.ty.max_value();
        self.min_value = self.ty.calc_min_value(self.bit_length);
        self.max_value = self.ty.calc_max_value(self.bit_length);
        Ok(())
    }

    pub(crate) fn validate_bit_length(&self, bits: usize) -> Result<(), String> {
        if self.ty.is_var_length() {
            return Err("Bitfield member cannot have variable length type.".to_string());
        }
        if self.length * 8 < bits {
            return Err(format!(
                "Value of property \"{}\" exceeds maximal length available by the type and/or forced serialisation length.",
                BIT_LENGTH
            ));
        }
        Ok(())
    }

    pub fn min_length(&self) -> usize {
        if self.ty.is_var_length() {
            1
        } else {
            self.length
        }
    }

    pub fn in_type_range(&self, v: i128) -> bool {
        self.type_min <= v && v <= self.type_max
    }

    pub fn in_serializable_range(&self, v: i128) -> bool {
        self.min_value <= v && v <= self.max_value
    }

    /// Resolve a value written as a named value, a reference to another field's
    /// value or a literal. `Err` carries a diagnostic for references that do
    /// not fit the type.
    pub(crate) fn resolve(
        &self,
        s: &str,
        named: impl Fn(&str) -> Option<i128>,
        ctx: &ParseCtx<'_>,
    ) -> Result<Option<i128>, String> {
        if common::is_valid_name(s) {
            if let Some(v) = named(s) {
                return Ok(Some(v));
            }
        }
        if common::is_valid_ref_name(s) {
            let Some(v) = ctx.str_to_numeric(s) else {
                return Ok(None);
            };
            if v < 0 && self.ty.is_unsigned() {
                return Err(format!(
                    "Cannot assign negative value ({} references as {}) to field with positive type.",
                    v, s
                ));
            }
            if i128::from(i64::MAX) < v && !self.ty.is_big_unsigned() {
                return Err(format!(
                    "Cannot assign such big positive number ({} referenced as {}).",
                    v, s
                ));
            }
            return Ok(Some(v));
        }
        let v = common::str_to_int(s);
        if self.ty.is_big_unsigned() {
            return Ok(v.filter(|v| 0 <= *v));
        }
        Ok(v.filter(|v| *v <= i128::from(i64::MAX)))
    }
}

/// A named value of an `int`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialValue {
    pub value: i128,
    pub versions: VersionWindow,
    pub description: String,
    pub display_name: String,
}

/// An inclusive valid range active during `versions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidRange {
    pub min: i128,
    pub max: i128,
    pub versions: VersionWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntField {
    pub layout: IntLayout,
    pub ser_offset: i128,
    pub scaling: (i64, i64),
    pub default_value: i128,
    pub specials: BTreeMap<String, SpecialValue>,
    pub valid_ranges: Vec<ValidRange>,
    pub units: Units,
    pub display_decimals: u32,
    pub display_offset: i128,
    pub valid_check_version: bool,
    pub sign_ext: bool,
    pub non_unique_specials_allowed: Option<bool>,
    pub available_length_limit: bool,
}

impl Default for IntField {
    fn default() -> Self {
        IntField {
            layout: IntLayout::default(),
            ser_offset: 0,
            scaling: (1, 1),
            default_value: 0,
            specials: BTreeMap::new(),
            valid_ranges: Vec::new(),
            units: Units::Unknown,
            display_decimals: 0,
            display_offset: 0,
            valid_check_version: false,
            sign_ext: true,
            non_unique_specials_allowed: None,
            available_length_limit: false,
        }
    }
}

impl IntField {
    pub fn ty(&self) -> IntType {
        self.layout.ty
    }

    pub fn endian(&self) -> Endian {
        self.layout.endian
    }

    pub fn min_value(&self) -> i128 {
        self.layout.min_value
    }

    pub fn max_value(&self) -> i128 {
        self.layout.max_value
    }

    pub fn non_unique_specials_allowed(&self) -> bool {
        self.non_unique_specials_allowed.unwrap_or(false)
    }

    /// Value of a literal, special name or field value reference.
    pub fn value_of(&self, s: &str, ctx: &ParseCtx<'_>) -> Option<i128> {
        self.layout
            .resolve(s, |n| self.specials.get(n).map(|sp| sp.value), ctx)
            .ok()
            .flatten()
    }

    fn parse_value(&self, s: &str, p: &KindParse<'_>) -> DslResult<Option<i128>> {
        self.layout
            .resolve(s, |n| self.specials.get(n).map(|sp| sp.value), &p.ctx)
            .map_err(|msg| p.error(msg))
    }

    fn update_ser_offset(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(SER_OFFSET)? {
            self.ser_offset = common::str_to_int(&v).ok_or_else(|| p.unexpected(SER_OFFSET, &v))?;
        }
        if self.ser_offset == 0 {
            return Ok(());
        }
        let l = &mut self.layout;
        let wide = l.ty.is_big_unsigned() || l.type_max == i128::from(i64::MAX);
        if !wide && (l.type_max - l.type_min) <= self.ser_offset.abs() {
            return Err(p.error("The serialisation offset value is too big or too small for selected type."));
        }
        l.min_value -= self.ser_offset;
        l.max_value -= self.ser_offset;
        Ok(())
    }

    fn update_scaling(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(SCALING)? else {
            return Ok(());
        };
        let bad_format = || {
            p.error(format!(
                "The scaling ratio value of the \"{}\" is not of expected format ({}).",
                common.name, v
            ))
        };
        let to_i64 = |s: &str| common::str_to_int(s).and_then(|n| i64::try_from(n).ok());
        let (num, denom) = match v.split_once('/') {
            None => (to_i64(&v).ok_or_else(bad_format)?, 1),
            Some((n, d)) => {
                if d.contains('/') || n.trim().is_empty() || d.trim().is_empty() {
                    return Err(bad_format());
                }
                (
                    to_i64(n).ok_or_else(bad_format)?,
                    to_i64(d).ok_or_else(bad_format)?,
                )
            }
        };
        if num == 0 || denom == 0 {
            return Err(p.error("Neither part of scaling fraction is allowed to be 0."));
        }
        self.scaling = (num, denom);
        Ok(())
    }

    fn update_specials(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let logger = p.logger();
        let mut recorded: BTreeMap<i128, String> = self
            .specials
            .iter()
            .map(|(n, s)| (s.value, n.clone()))
            .collect();
        for s in p.node().children_named(SPECIAL) {
            let sp = Props::new(s, NAMED_VALUE_PROPS);
            let name = sp.required(props::NAME, logger)?;
            let val = sp.required(VAL, logger)?;
            if !common::is_valid_name(&name) {
                return Err(p.error_at(
                    s,
                    format!("Property \"{}\" has unexpected value ({}).", props::NAME, name),
                ));
            }
            if self.specials.contains_key(&name) {
                return Err(p.error_at(
                    s,
                    format!(
                        "Special with name \"{}\" was already assigned to \"{}\" element.",
                        name, common.name
                    ),
                ));
            }
            let Some(value) = self.parse_value(&val, p)? else {
                return Err(p.error_at(
                    s,
                    format!("Value of special \"{}\" ({}) cannot be recognized.", name, val),
                ));
            };
            if !self.non_unique_specials_allowed() {
                if let Some(prev) = recorded.get(&value) {
                    return Err(p.error_at(
                        s,
                        format!(
                            "Value of special \"{}\" ({}) has already been defined as \"{}\".",
                            name, val, prev
                        ),
                    ));
                }
                recorded.insert(value, name.clone());
            }
            if !self.layout.in_type_range(value) {
                return Err(p.error_at(
                    s,
                    format!(
                        "Special value \"{}\" is outside the range of available values within a type.",
                        name
                    ),
                ));
            }
            if !self.layout.in_serializable_range(value) {
                p.warn_at(
                    s,
                    format!(
                        "Special value \"{}\" is outside the range of correctly serializable values.",
                        name
                    ),
                );
            }
            let versions = props::get_and_check_versions(
                &sp,
                common.versions,
                p.ctx.schema_props().version,
                logger,
            )?;
            let description = sp.single(props::DESCRIPTION, logger)?.unwrap_or_default();
            let display_name = match sp.single(props::DISPLAY_NAME, logger)? {
                Some(d) => p.string_value(props::DISPLAY_NAME, &d)?,
                None => String::new(),
            };
            self.specials.insert(
                name,
                SpecialValue {
                    value,
                    versions,
                    description,
                    display_name,
                },
            );
        }
        Ok(())
    }

    /// Validate and assign `defaultValue` (or `defaultValidValue`).
    fn set_default(&mut self, common: &FieldCommon, v: &str, p: &KindParse<'_>) -> DslResult<()> {
        let Some(value) = self.parse_value(v, p)? else {
            return Err(p.error(format!(
                "The default value of the \"{}\" cannot be recongized ({}).",
                common.name, v
            )));
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

    fn update_default_valid_value(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(DEFAULT_VALID_VALUE)? else {
            return Ok(());
        };
        let schema = p.ctx.schema_props();
        if !schema.property_supported(DEFAULT_VALID_VALUE) {
            p.warn(format!(
                "Property \"{}\" is not supported for DSL version {}, ignoring...",
                DEFAULT_VALID_VALUE, schema.dsl_version
            ));
            return Ok(());
        }
        self.set_default(common, &v, p)?;
        self.valid_ranges.push(ValidRange {
            min: self.default_value,
            max: self.default_value,
            versions: common.versions,
        });
        Ok(())
    }

    fn check_range_value(&self, v: i128, what: &str, p: &KindParse<'_>) -> DslResult<()> {
        if v < self.layout.type_min {
            return Err(p.error(format!("{} ({}) is below the type's minimal value.", what, v)));
        }
        if self.layout.type_max < v {
            return Err(p.error(format!("{} ({}) is above the type's maximal value.", what, v)));
        }
        if !self.layout.in_serializable_range(v) {
            p.warn(format!(
                "{} ({}) is outside the range of correctly serializable values.",
                what, v
            ));
        }
        Ok(())
    }

    fn range_of(&self, prop: &str, s: &str, p: &KindParse<'_>) -> DslResult<(i128, i128)> {
        if prop == VALID_RANGE {
            let (lo, hi) = common::parse_range(s).ok_or_else(|| p.unexpected(VALID_RANGE, s))?;
            let min = self
                .parse_value(&lo, p)?
                .ok_or_else(|| p.error(format!("Invalid min value in valid range ({}).", s)))?;
            let max = self
                .parse_value(&hi, p)?
                .ok_or_else(|| p.error(format!("Invalid max value in valid range ({}).", s)))?;
            if max < min {
                return Err(p.error(format!(
                    "Min value must be less than max in valid range ({}).",
                    s
                )));
            }
            self.check_range_value(min, "Range's min value", p)?;
            self.check_range_value(max, "Range's max value", p)?;
            return Ok((min, max));
        }

        let v = self.parse_value(s, p)?.ok_or_else(|| {
            p.error(format!(
                "Property value \"{}\" of int element \"{}\" cannot be properly parsed.",
                prop,
                p.node().name
            ))
        })?;
        self.check_range_value(v, &format!("Property value \"{}\"", prop), p)?;
        Ok(match prop {
            VALID_MIN => (v, self.layout.max_value),
            VALID_MAX => (self.layout.min_value, v),
            _ => (v, v),
        })
    }

    fn update_valid_ranges(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let logger = p.logger();
        for prop in [VALID_RANGE, VALID_VALUE, VALID_MIN, VALID_MAX] {
            for source in p.props.sources(prop) {
                let (text, versions) = match source {
                    PropSource::Attr(v) => (v.trim().to_string(), common.versions),
                    PropSource::Child(c) => {
                        let text = props::node_value(c, logger)?;
                        let cp = Props::new(c, &[]);
                        let versions = props::get_and_check_versions(
                            &cp,
                            common.versions,
                            p.ctx.schema_props().version,
                            logger,
                        )?;
                        (text, versions)
                    }
                };
                let (min, max) = self.range_of(prop, &text, p)?;
                self.valid_ranges.push(ValidRange { min, max, versions });
            }
        }
        self.valid_ranges = merge_ranges(std::mem::take(&mut self.valid_ranges));
        Ok(())
    }

    fn update_sign_ext(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.bool_prop(SIGN_EXT)? else {
            return Ok(());
        };
        self.sign_ext = v;
        let bits = if common.in_bitfield {
            self.layout.bit_length
        } else {
            self.layout.min_length() * 8
        };
        if self.layout.ty.is_unsigned() || self.layout.ty.max_length() * 8 <= bits {
            p.warn(format!(
                "Property \"{}\" is relevant only to signed types with length limitation.",
                SIGN_EXT
            ));
        }
        Ok(())
    }
}

/// Sort by window, merge touching ranges of the same window, then sort by value.
fn merge_ranges(mut ranges: Vec<ValidRange>) -> Vec<ValidRange> {
    ranges.sort_by_key(|r| (r.versions.since, r.versions.deprecated, r.min, r.max));
    let mut merged: Vec<ValidRange> = Vec::with_capacity(ranges.len());
    for r in ranges {
        if let Some(last) = merged.last_mut() {
            if last.versions.since == r.versions.since
                && last.versions.deprecated == r.versions.deprecated
                && r.min <= last.max + 1
            {
                last.max = last.max.max(r.max);
                continue;
            }
        }
        merged.push(r);
    }
    merged.sort_by_key(|r| (r.min, r.max, r.versions.since, r.versions.deprecated));
    merged
}

impl FieldImpl for IntField {
    fn kind(&self) -> Kind {
        Kind::Int
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[SPECIAL]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.layout.parse(common, p)?;
        self.update_scaling(common, p)?;
        self.update_ser_offset(p)?;

        if self.non_unique_specials_allowed.is_none() {
            self.non_unique_specials_allowed = Some(!p.supports(Feature::NonUniqueSpecials));
        }
        if let Some(v) = p.bool_prop(NON_UNIQUE_SPECIALS_ALLOWED)? {
            self.non_unique_specials_allowed = Some(v);
        }
        self.update_specials(common, p)?;

        if let Some(v) = p.single(DEFAULT_VALUE)? {
            self.set_default(common, &v, p)?;
        }
        self.update_default_valid_value(common, p)?;
        if let Some(v) = p.bool_prop(VALID_CHECK_VERSION)? {
            self.valid_check_version = v;
        }
        self.update_valid_ranges(common, p)?;

        if let Some(v) = p.single(UNITS)? {
            self.units = Units::parse(&v).ok_or_else(|| p.unexpected(UNITS, &v))?;
        }
        if let Some(v) = p.single(DISPLAY_DECIMALS)? {
            self.display_decimals =
                common::str_to_unsigned(&v).ok_or_else(|| p.unexpected(DISPLAY_DECIMALS, &v))?;
        }
        if let Some(v) = p.single(DISPLAY_OFFSET)? {
            self.display_offset =
                common::str_to_int(&v).ok_or_else(|| p.unexpected(DISPLAY_OFFSET, &v))?;
        }
        self.update_sign_ext(common, p)?;
        p.check_deprecated(DISPLAY_SPECIALS);
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
        self.specials.get(rest).map(|s| s.value)
    }

    fn semantic_type_allowed(&self, ty: SemanticType, ctx: &ParseCtx<'_>) -> bool {
        match ty {
            SemanticType::Version => true,
            SemanticType::Length => ctx.supports(Feature::SemanticTypeLength),
            _ => false,
        }
    }

    fn inner_ref<'a>(&'a self, this: &'a Field, rest: &'a str, _reg: &'a Registry) -> FieldRefInfo<'a> {
        if self.specials.contains_key(rest) {
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
    fn type_bounds() {
        assert_eq!(IntType::Uint64.max_value(), i128::from(u64::MAX));
        assert_eq!(IntType::Int16.min_value(), -32768);
        assert_eq!(IntType::Uintvar.max_length(), 10);
        assert!(IntType::Uintvar.is_big_unsigned());
        assert!(!IntType::Int64.is_big_unsigned());
        assert_eq!(IntType::parse("UINT32"), Some(IntType::Uint32));
        assert_eq!(IntType::parse("float"), None);
    }

    #[test]
    fn serializable_bounds() {
        assert_eq!(IntType::Uint8.calc_max_value(4), 15);
        assert_eq!(IntType::Int8.calc_min_value(4), -8);
        assert_eq!(IntType::Int8.calc_max_value(4), 7);
        assert_eq!(IntType::Uint64.calc_max_value(64), i128::from(u64::MAX));
        assert_eq!(IntType::Int64.calc_min_value(64), i128::from(i64::MIN));
        assert_eq!(IntType::Uintvar.calc_max_value(16), (1 << 14) - 1);
        assert_eq!(IntType::Intvar.calc_max_value(16), (1 << 13) - 1);
        assert_eq!(IntType::Intvar.calc_min_value(16), -(1 << 13));
        assert_eq!(IntType::Uintvar.calc_max_value(80), i128::from(u64::MAX));
    }

    #[test]
    fn ranges_merge_per_window() {
        let w = VersionWindow::default();
        let later = VersionWindow::new(2, crate::version::NOT_YET_DEPRECATED, false);
        let merged = merge_ranges(vec![
            ValidRange { min: 5, max: 10, versions: w },
            ValidRange { min: 0, max: 4, versions: w },
            ValidRange { min: 20, max: 30, versions: w },
            ValidRange { min: 11, max: 12, versions: later },
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!((merged[0].min, merged[0].max), (0, 10));
        assert_eq!((merged[1].min, merged[1].max), (11, 12));
        assert_eq!((merged[2].min, merged[2].max), (20, 30));
    }
}
