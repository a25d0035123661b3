//! `set` fields: named bits of an unsigned integer.

use std::collections::BTreeMap;

use crate::common::{self, Endian};
use crate::error::DslResult;
use crate::props::{self, Props};
use crate::registry::{ParseCtx, Registry};
use crate::version::VersionWindow;

use super::int::{IntType, AVAILABLE_LENGTH_LIMIT, BIT_LENGTH, DEFAULT_VALUE, ENDIAN, LENGTH, TYPE, VALID_CHECK_VERSION};
use super::{Field, FieldCommon, FieldImpl, FieldRefInfo, FieldRefType, Kind, KindParse};

pub const RESERVED_VALUE: &str = "reservedValue";
pub const RESERVED: &str = "reserved";
pub const NON_UNIQUE_ALLOWED: &str = "nonUniqueAllowed";
pub const BIT: &str = "bit";
pub const IDX: &str = "idx";

const PROPS: &[&str] = &[
    DEFAULT_VALUE,
    ENDIAN,
    LENGTH,
    BIT_LENGTH,
    RESERVED_VALUE,
    VALID_CHECK_VERSION,
    TYPE,
    NON_UNIQUE_ALLOWED,
    AVAILABLE_LENGTH_LIMIT,
];

const BIT_PROPS: &[&str] = &[
    props::NAME,
    IDX,
    DEFAULT_VALUE,
    RESERVED_VALUE,
    RESERVED,
    props::SINCE_VERSION,
    props::DEPRECATED,
    props::DESCRIPTION,
    props::DISPLAY_NAME,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitInfo {
    pub idx: u32,
    pub default_value: bool,
    pub reserved: bool,
    pub reserved_value: bool,
    pub versions: VersionWindow,
    pub description: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetField {
    pub ty: Option<IntType>,
    pub endian: Endian,
    pub length: usize,
    pub bit_length: usize,
    pub bits: BTreeMap<String, BitInfo>,
    /// Names per bit index, in declaration order.
    pub rev_bits: BTreeMap<u32, Vec<String>>,
    pub non_unique_allowed: bool,
    pub default_bit_value: bool,
    pub reserved_bit_value: bool,
    pub valid_check_version: bool,
    pub available_length_limit: bool,
}

/// Smallest unsigned type able to hold `length` bytes.
fn type_for_length(length: usize) -> IntType {
    match length {
        0 | 1 => IntType::Uint8,
        2 => IntType::Uint16,
        3 | 4 => IntType::Uint32,
        _ => IntType::Uint64,
    }
}

impl SetField {
    pub fn ty(&self) -> IntType {
        self.ty.unwrap_or_else(|| type_for_length(self.length))
    }

    pub fn is_unique(&self) -> bool {
        self.rev_bits.values().all(|names| names.len() <= 1)
    }

    fn bool_value(&self, s: &str, ctx: &ParseCtx<'_>) -> Option<bool> {
        if let Some(b) = common::str_to_bool(s) {
            return Some(b);
        }
        if common::is_valid_ref_name(s) {
            return ctx.str_to_bool(s);
        }
        None
    }

    fn update_type_and_length(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(TYPE)? {
            let ty = IntType::parse(&v)
                .filter(|t| t.is_unsigned())
                .ok_or_else(|| p.unexpected(TYPE, &v))?;
            match self.ty {
                Some(prev) if prev != ty => {
                    return Err(p.error("Type cannot be changed after reuse"));
                }
                _ => self.ty = Some(ty),
            }
        }

        let max_length = self.ty.map(IntType::max_length).unwrap_or(8);
        match p.single(LENGTH)? {
            Some(v) => {
                let len = common::str_to_usize(&v)
                    .filter(|l| *l != 0 && *l <= max_length)
                    .ok_or_else(|| p.unexpected(LENGTH, &v))?;
                if self.length != len {
                    if self.length != 0 {
                        return Err(p.error("Length cannot be changed after reuse"));
                    }
                    self.length = len;
                }
            }
            None => {
                if self.length == 0 {
                    match self.ty {
                        Some(ty) => self.length = ty.max_length(),
                        None if !common.in_bitfield => {
                            return Err(p.structural(format!(
                                "Missing value for mandatory property \"{}\" for \"{}\" element.",
                                LENGTH,
                                p.node().name
                            )));
                        }
                        None => {}
                    }
                }
            }
        }

        match p.single(BIT_LENGTH)? {
            Some(_) if !common.in_bitfield => {
                p.warn(format!(
                    "The property \"{}\" is applicable only to the members of \"{}\"",
                    BIT_LENGTH,
                    Kind::Bitfield.as_str()
                ));
                self.bit_length = self.length * 8;
            }
            Some(v) => {
                let bits = common::str_to_usize(&v)
                    .filter(|b| *b != 0)
                    .filter(|b| self.length == 0 || *b <= self.length * 8)
                    .ok_or_else(|| p.unexpected(BIT_LENGTH, &v))?;
                self.bit_length = bits;
            }
            None => {
                if self.bit_length == 0 {
                    if self.length == 0 {
                        return Err(p.structural(format!(
                            "Missing value for mandatory property \"{}\" for \"{}\" element.",
                            BIT_LENGTH,
                            p.node().name
                        )));
                    }
                    self.bit_length = self.length * 8;
                }
            }
        }

        if self.length == 0 {
            self.length = (self.bit_length - 1) / 8 + 1;
        }
        if self.ty.is_none() {
            self.ty = Some(type_for_length(self.length));
        }
        Ok(())
    }

    fn update_bits(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let logger = p.logger();
        for b in p.node().children_named(BIT) {
            let bp = Props::new(b, BIT_PROPS);
            let name = bp.required(props::NAME, logger)?;
            let idx_str = bp.required(IDX, logger)?;
            bp.check_unknown(&[BIT_PROPS], &[], logger)?;
            if !common::is_valid_name(&name) {
                return Err(p.error_at(
                    b,
                    format!("Property \"{}\" has unexpected value ({}).", props::NAME, name),
                ));
            }
            if self.bits.contains_key(&name) {
                return Err(p.error_at(
                    b,
                    format!(
                        "Bit with name \"{}\" has already been defined for set \"{}\".",
                        name, common.name
                    ),
                ));
            }
            let idx = common::str_to_unsigned(&idx_str)
                .ok_or_else(|| props::unexpected_value(logger, b, IDX, &idx_str))?;
            if self.bit_length <= idx as usize {
                return Err(p.error_at(
                    b,
                    format!(
                        "Index of the bit ({}) must be less than number of available bits ({}).",
                        idx, self.bit_length
                    ),
                ));
            }
            if !self.non_unique_allowed {
                if let Some(prev) = self.rev_bits.get(&idx).and_then(|n| n.first()) {
                    return Err(p.error_at(
                        b,
                        format!("Bit \"{}\" has been already defined as \"{}\".", idx, prev),
                    ));
                }
            }

            let mut info = BitInfo {
                idx,
                default_value: self.default_bit_value,
                reserved: false,
                reserved_value: self.reserved_bit_value,
                versions: common.versions,
                description: String::new(),
                display_name: String::new(),
            };
            for (prop, slot) in [
                (DEFAULT_VALUE, &mut info.default_value),
                (RESERVED, &mut info.reserved),
                (RESERVED_VALUE, &mut info.reserved_value),
            ] {
                if let Some(v) = bp.single(prop, logger)? {
                    *slot = self
                        .bool_value(&v, &p.ctx)
                        .ok_or_else(|| props::unexpected_value(logger, b, prop, &v))?;
                }
            }
            info.versions = props::get_and_check_versions(
                &bp,
                common.versions,
                p.ctx.schema_props().version,
                logger,
            )?;
            if info.reserved
                && (common.versions.since < info.versions.since
                    || info.versions.deprecated < common.versions.deprecated)
            {
                return Err(p.error_at(
                    b,
                    "Cannot modify version information on explicity reserved bits.",
                ));
            }

            for other in self.rev_bits.get(&idx).into_iter().flatten() {
                let Some(prev) = self.bits.get(other) else {
                    continue;
                };
                let disjoint = prev.versions.deprecated <= info.versions.since
                    || info.versions.deprecated <= prev.versions.since;
                if disjoint {
                    continue;
                }
                for (prop, same) in [
                    (DEFAULT_VALUE, info.default_value == prev.default_value),
                    (RESERVED, info.reserved == prev.reserved),
                    (RESERVED_VALUE, info.reserved_value == prev.reserved_value),
                ] {
                    if !same {
                        return Err(p.error_at(
                            b,
                            format!(
                                "Inconsistent value of \"{}\" property for bit {}.",
                                prop, idx
                            ),
                        ));
                    }
                }
            }

            info.description = bp.single(props::DESCRIPTION, logger)?.unwrap_or_default();
            if let Some(d) = bp.single(props::DISPLAY_NAME, logger)? {
                info.display_name = p
                    .ctx
                    .str_to_string_value(&d)
                    .ok_or_else(|| props::unexpected_value(logger, b, props::DISPLAY_NAME, &d))?;
            }
            self.rev_bits.entry(idx).or_default().push(name.clone());
            self.bits.insert(name, info);
        }
        Ok(())
    }
}

impl FieldImpl for SetField {
    fn kind(&self) -> Kind {
        Kind::Set
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[BIT]
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
        self.update_type_and_length(common, p)?;

        if let Some(allowed) = p.bool_prop(NON_UNIQUE_ALLOWED)? {
            if self.non_unique_allowed && !allowed && !self.is_unique() {
                return Err(p.error(format!(
                    "Cannot clear \"{}\" property value while having multiple names for the same bit(s).",
                    NON_UNIQUE_ALLOWED
                )));
            }
            self.non_unique_allowed = allowed;
        }
        if let Some(v) = p.bool_prop(VALID_CHECK_VERSION)? {
            self.valid_check_version = v;
        }
        for (prop, slot) in [
            (DEFAULT_VALUE, &mut self.default_bit_value),
            (RESERVED_VALUE, &mut self.reserved_bit_value),
        ] {
            if let Some(v) = p.single(prop)? {
                let value = if let Some(b) = common::str_to_bool(&v) {
                    Some(b)
                } else if common::is_valid_ref_name(&v) {
                    p.ctx.str_to_bool(&v)
                } else {
                    None
                };
                *slot = value.ok_or_else(|| p.unexpected(prop, &v))?;
            }
        }
        if let Some(v) = p.bool_prop(AVAILABLE_LENGTH_LIMIT)? {
            self.available_length_limit = v;
        }
        self.update_bits(common, p)
    }

    fn min_length(&self, _reg: &Registry) -> usize {
        self.length
    }

    fn bit_length(&self, common: &FieldCommon, _reg: &Registry) -> usize {
        if common.in_bitfield {
            self.bit_length
        } else {
            0
        }
    }

    fn validate_bit_length(&self, bit_length: usize, _reg: &Registry) -> Result<(), String> {
        if self.length * 8 < bit_length {
            return Err(format!(
                "Value of property \"{}\" exceeds maximal length available by the type and/or forced serialisation length.",
                BIT_LENGTH
            ));
        }
        Ok(())
    }

    fn str_to_numeric(&self, rest: &str, _reg: &Registry) -> Option<i128> {
        self.bool_at(rest).map(i128::from)
    }

    fn str_to_bool(&self, rest: &str, _reg: &Registry) -> Option<bool> {
        self.bool_at(rest)
    }

    fn inner_ref<'a>(&'a self, this: &'a Field, rest: &'a str, _reg: &'a Registry) -> FieldRefInfo<'a> {
        if self.bits.contains_key(rest) {
            return FieldRefInfo::inner_value(this, rest);
        }
        FieldRefInfo::invalid()
    }

    fn valid_ref_type(&self, ty: FieldRefType, _reg: &Registry) -> bool {
        ty == FieldRefType::InnerValue
    }

    fn comparable_to_value(&self, val: &str, ctx: &ParseCtx<'_>) -> bool {
        let value = if common::is_valid_ref_name(val) {
            ctx.str_to_numeric(val)
        } else {
            common::str_to_int(val)
        };
        match value {
            Some(v) if v < 0 => {
                ctx.logger
                    .error(format!("Cannot compare negative value ({} referenced as {}).", v, val));
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn comparable_to_field(&self, other: &Field, _reg: &Registry) -> bool {
        other.kind() == Kind::Set
    }
}

impl SetField {
    fn bool_at(&self, rest: &str) -> Option<bool> {
        if rest.is_empty() {
            return Some(self.default_bit_value);
        }
        self.bits.get(rest).map(|b| b.default_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_follows_length() {
        assert_eq!(type_for_length(1), IntType::Uint8);
        assert_eq!(type_for_length(3), IntType::Uint32);
        assert_eq!(type_for_length(5), IntType::Uint64);
        let s = SetField {
            length: 2,
            ..SetField::default()
        };
        assert_eq!(s.ty(), IntType::Uint16);
    }
}
