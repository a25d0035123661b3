//! `string` fields.

use crate::common::{self, STRING_REF_PREFIX};
use crate::error::DslResult;
use crate::props::{self, Props};
use crate::registry::{ParseCtx, Registry};
use crate::schema::Feature;
use crate::version::VersionWindow;

use super::data::LENGTH_PREFIX;
use super::int::{DEFAULT_VALID_VALUE, DEFAULT_VALUE, LENGTH, VALID_VALUE};
use super::prefix::{self, Prefix};
use super::{Field, FieldCommon, FieldImpl, FieldRefType, Kind, KindParse};

pub const ENCODING: &str = "encoding";
pub const ZERO_TERM_SUFFIX: &str = "zeroTermSuffix";

const PROPS: &[&str] = &[
    LENGTH,
    ENCODING,
    ZERO_TERM_SUFFIX,
    DEFAULT_VALUE,
    DEFAULT_VALID_VALUE,
    VALID_VALUE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidString {
    pub value: String,
    pub versions: VersionWindow,
}

#[derive(Debug, Clone, Default)]
pub struct StringField {
    pub length: usize,
    pub prefix: Prefix,
    pub zero_term: bool,
    pub encoding: String,
    pub default_value: String,
    pub valid_values: Vec<ValidString>,
}

impl StringField {
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
            return Err(p.error("Cannot force fixed length after reusing string with length prefix."));
        }
        if self.zero_term {
            return Err(p.error("Cannot force fixed length after reusing string with zero suffix."));
        }
        self.length = len;
        Ok(())
    }

    fn update_zero_term(&mut self, p: &KindParse<'_>) -> DslResult<()> {
        let Some(v) = p.single(ZERO_TERM_SUFFIX)? else {
            return Ok(());
        };
        let zero = common::str_to_bool(&v).ok_or_else(|| p.unexpected(ZERO_TERM_SUFFIX, &v))?;
        if zero == self.zero_term || !zero {
            self.zero_term = zero;
            return Ok(());
        }
        if self.length != 0 {
            return Err(p.error("Cannot apply zero suffix to fixed length strings."));
        }
        if !self.prefix.is_none() {
            return Err(p.error("Cannot apply zero suffix to strings having length prefix."));
        }
        self.zero_term = true;
        Ok(())
    }

    fn check_default_len(&self, p: &KindParse<'_>) {
        if self.length != 0 && self.length < self.default_value.len() {
            p.warn(format!(
                "The default value ({}) is too long for proper serialisation.",
                self.default_value
            ));
        }
    }

    fn valid_value_supported(&self, p: &KindParse<'_>, prop: &str) -> bool {
        if p.supports(Feature::ValidValueInStringAndData) {
            return true;
        }
        p.warn(format!(
            "Property \"{}\" for <string> field is not supported for DSL version {}, ignoring...",
            prop,
            p.ctx.schema_props().dsl_version
        ));
        false
    }

    fn update_default(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.single(DEFAULT_VALUE)? {
            self.default_value = p.string_value(DEFAULT_VALUE, &v)?;
        }
        self.check_default_len(p);

        let Some(v) = p.single(DEFAULT_VALID_VALUE)? else {
            return Ok(());
        };
        if !self.valid_value_supported(p, DEFAULT_VALID_VALUE) {
            return Ok(());
        }
        self.default_value = p.string_value(DEFAULT_VALID_VALUE, &v)?;
        self.check_default_len(p);
        self.valid_values.push(ValidString {
            value: self.default_value.clone(),
            versions: common.versions,
        });
        Ok(())
    }

    fn valid_value(&self, common: &FieldCommon, p: &KindParse<'_>, s: &str) -> DslResult<String> {
        p.ctx.str_to_string_value(s).ok_or_else(|| {
            p.error(format!(
                "Property value \"{}\" of string element \"{}\" cannot be properly parsed.",
                VALID_VALUE, common.name
            ))
        })
    }

    fn update_valid_values(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        if let Some(v) = p.node().attr(VALID_VALUE) {
            if self.valid_value_supported(p, VALID_VALUE) {
                let value = self.valid_value(common, p, v)?;
                self.valid_values.push(ValidString {
                    value,
                    versions: common.versions,
                });
            }
        }
        for c in p.node().children_named(VALID_VALUE) {
            let s = props::node_value(c, p.logger())?;
            if !self.valid_value_supported(p, VALID_VALUE) {
                continue;
            }
            let value = self.valid_value(common, p, &s)?;
            let versions = props::get_and_check_versions(
                &Props::new(c, &[]),
                common.versions,
                p.ctx.schema_props().version,
                p.logger(),
            )?;
            self.valid_values.push(ValidString { value, versions });
        }
        self.valid_values.sort_by(|a, b| a.value.cmp(&b.value));
        Ok(())
    }
}

impl FieldImpl for StringField {
    fn kind(&self) -> Kind {
        Kind::String
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
        if let Some(v) = p.single(ENCODING)? {
            self.encoding = v;
        }
        self.update_length(p)?;
        prefix::parse_prefix(p, common, Kind::String, LENGTH_PREFIX, &mut self.prefix)?;
        if !self.prefix.is_none() {
            if self.length != 0 {
                return Err(p.error("Length prefix field is not applicable to fixed length strings."));
            }
            if self.zero_term {
                return Err(p.error(
                    "Length prefix field is not applicable to zero terminated strings.",
                ));
            }
        }
        self.update_zero_term(p)?;
        self.update_default(common, p)?;
        self.update_valid_values(common, p)
    }

    fn min_length(&self, reg: &Registry) -> usize {
        if self.length != 0 {
            return self.length;
        }
        if self.zero_term {
            return 1;
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

    fn str_to_string(&self, rest: &str, _reg: &Registry) -> Option<String> {
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

    /// Literals always compare; `^ref` must name another string field.
    fn comparable_to_value(&self, val: &str, ctx: &ParseCtx<'_>) -> bool {
        let Some(reference) = val.strip_prefix(STRING_REF_PREFIX) else {
            return true;
        };
        match ctx.find_field(reference) {
            None => {
                ctx.logger
                    .error(format!("Referenced field ({}) is not defined.", val));
                false
            }
            Some(f) if f.kind() != Kind::String => {
                ctx.logger
                    .error(format!("Referenced field ({}) is not <string>.", val));
                false
            }
            Some(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_suffix_occupies_a_byte() {
        let reg = Registry::default();
        let s = StringField {
            zero_term: true,
            ..StringField::default()
        };
        assert_eq!(s.min_length(&reg), 1);
        assert_eq!(s.max_length(&reg), common::MAX_POSSIBLE_LENGTH);
        let fixed = StringField {
            length: 6,
            ..StringField::default()
        };
        assert_eq!(fixed.min_length(&reg), 6);
        assert_eq!(fixed.max_length(&reg), 6);
    }
}
