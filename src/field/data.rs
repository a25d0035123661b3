//! `data` fields: raw byte sequences.

use crate::common::{self, STRING_REF_PREFIX};
use crate::error::DslResult;
use crate::props::{self, Props};
use crate::registry::{ParseCtx, Registry};
use crate::schema::Feature;
use crate::version::VersionWindow;
use crate::xml::XmlNode;

use super::int::{DEFAULT_VALID_VALUE, DEFAULT_VALUE, LENGTH, VALID_VALUE};
use super::prefix::{self, Prefix};
use super::{Field, FieldCommon, FieldImpl, FieldRefType, Kind, KindParse};

pub const LENGTH_PREFIX: &str = "lengthPrefix";

const PROPS: &[&str] = &[LENGTH, DEFAULT_VALUE, DEFAULT_VALID_VALUE, VALID_VALUE];

/// Value listed by `validValue`, valid within `versions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidData {
    pub value: Vec<u8>,
    pub versions: VersionWindow,
}

#[derive(Debug, Clone, Default)]
pub struct DataField {
    /// Fixed length, 0 when the sequence is not fixed.
    pub length: usize,
    pub prefix: Prefix,
    pub default_value: Vec<u8>,
    pub valid_values: Vec<ValidData>,
}

/// Hex bytes, or `^ref` to another data value.
fn parse_bytes(s: &str, ctx: &ParseCtx<'_>) -> Option<Vec<u8>> {
    if let Some(reference) = s.strip_prefix(STRING_REF_PREFIX) {
        if ctx.supports(Feature::FieldValueReference) {
            return ctx.str_to_data(reference);
        }
    }
    hex_bytes(s)
}

fn hex_bytes(s: &str) -> Option<Vec<u8>> {
    let digits: String = s.chars().filter(|c| *c != ' ').collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    common::str_to_data(&digits)
}

impl DataField {
    fn update_length(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(LENGTH)? else {
            return Ok(());
        };
        let len = common::str_to_usize(&v)
            .filter(|l| *l != 0)
            .ok_or_else(|| p.unexpected(LENGTH, &v))?;
        if self.length == len {
            return Ok(());
        }
        if !self.prefix.is_none() {
            return Err(p.error(
                "Cannot force fixed length after reusing data sequence with length prefix.",
            ));
        }
        self.length = len;
        Ok(())
    }

    fn check_default_len(&self, p: &KindParse<'_>) {
        if self.length != 0 && self.length < self.default_value.len() {
            p.warn("The default value is too long for proper serialisation.");
        }
    }

    fn update_default(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(DEFAULT_VALUE)? {
            self.default_value = parse_bytes(&v, &p.ctx).ok_or_else(|| {
                p.error(format!(
                    "Property \"{}\" of element \"{}\" has unexpected value ({}), expected to be hex values string with even number of non-white characters.",
                    DEFAULT_VALUE, common.name, v
                ))
            })?;
        }
        self.check_default_len(p);

        let Some(v) = p.single(DEFAULT_VALID_VALUE)? else {
            return Ok(());
        };
        if !self.valid_value_supported(p, DEFAULT_VALID_VALUE) {
            return Ok(());
        }
        self.default_value = parse_bytes(&v, &p.ctx).ok_or_else(|| p.unexpected(DEFAULT_VALID_VALUE, &v))?;
        self.check_default_len(p);
        self.valid_values.push(ValidData {
            value: self.default_value.clone(),
            versions: common.versions,
        });
        Ok(())
    }

    fn valid_value_supported(&self, p: &KindParse<'_>, prop: &str) -> bool {
        if p.supports(Feature::ValidValueInStringAndData) {
            return true;
        }
        p.warn(format!(
            "Property \"{}\" for <data> field is not supported for DSL version {}, ignoring...",
            prop,
            p.ctx.schema_props().dsl_version
        ));
        false
    }

    fn valid_value(&self, common: &FieldCommon, p: &KindParse<'_>, s: &str) -> DslResult<Vec<u8>> {
        parse_bytes(s, &p.ctx).ok_or_else(|| {
            p.error(format!(
                "Property value \"{}\" of <data> element \"{}\" cannot be properly parsed.",
                VALID_VALUE, common.name
            ))
        })
    }

    fn update_valid_values(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.node().attr(VALID_VALUE) {
            if self.valid_value_supported(p, VALID_VALUE) {
                let value = self.valid_value(common, p, v.trim())?;
                self.valid_values.push(ValidData {
                    value,
                    versions: common.versions,
                });
            }
        }
        let children: Vec<&XmlNode> = p.node().children_named(VALID_VALUE).collect();
        for c in children {
            let s = props::node_value(c, p.logger())?;
            if !self.valid_value_supported(p, VALID_VALUE) {
                continue;
            }
            let value = self.valid_value(common, p, &s)?;
            let cp = Props::new(c, &[]);
            let versions = props::get_and_check_versions(
                &cp,
                common.versions,
                p.ctx.schema_props().version,
                p.logger(),
            )?;
            self.valid_values.push(ValidData { value, versions });
        }
        self.valid_values.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(())
    }
}

impl FieldImpl for DataField {
    fn kind(&self) -> Kind {
        Kind::Data
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn possible_props(&self) -> &'static [&'static str] {
        &[LENGTH_PREFIX]
    }

    fn extra_children(&self) -> &'static [&'static str] {
        &[LENGTH_PREFIX]
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        self.update_length(p)?;
        prefix::parse_prefix(p, common, Kind::Data, LENGTH_PREFIX, &mut self.prefix)?;
        if !self.prefix.is_none() && self.length != 0 {
            return Err(p.error(
                "Length prefix field is not applicable to fixed length data sequences.",
            ));
        }
        self.update_default(common, p)?;
        self.update_valid_values(common, p)
    }

    fn min_length(&self, reg: &Registry) -> usize {
        if self.length != 0 {
            return self.length;
        }
        self.prefix.min_length(reg)
    }

    fn max_length(&self, reg: &Registry) -> usize {
        if self.length != 0 {
            return self.length;
        }
        self.prefix
            .max_span(reg)
            .unwrap_or(common::MAX_POSSIBLE_LENGTH)
    }

    fn str_to_data(&self, rest: &str, _reg: &Registry) -> Option<Vec<u8>> {
        if !rest.is_empty() {
            return None;
        }
        Some(self.default_value.clone())
    }

    fn valid_ref_type(&self, ty: FieldRefType, _reg: &Registry) -> bool {
        ty == FieldRefType::Size
    }

    fn verify_siblings(&self, common: &FieldCommon, siblings: &[Field], ctx: &ParseCtx<'_>) -> DslResult<()> {
        prefix::verify_detached(common, &self.prefix, siblings, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_with_spaces() {
        assert_eq!(hex_bytes("01 ab"), Some(vec![0x01, 0xab]));
        assert_eq!(hex_bytes("abc"), None);
        assert_eq!(hex_bytes("zz"), None);
        assert_eq!(hex_bytes(""), Some(vec![]));
    }
}
