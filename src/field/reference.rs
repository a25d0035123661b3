//! `ref` fields: an alias of a field defined elsewhere, serialized the same way.

use crate::common;
use crate::error::DslResult;
use crate::registry::{FieldId, ParseCtx, Registry};
use crate::schema::Feature;

use super::int::BIT_LENGTH;
use super::{Field, FieldCommon, FieldImpl, FieldRefInfo, FieldRefType, Kind, KindParse, SemanticType};

pub const FIELD: &str = "field";

const PROPS: &[&str] = &[FIELD, BIT_LENGTH];

#[derive(Debug, Clone, Default)]
pub struct RefField {
    /// Always set once the field is parsed.
    pub target: Option<FieldId>,
    /// Bits used as a bitfield member.
    pub bit_length: usize,
}

impl RefField {
    fn target_field<'a>(&self, reg: &'a Registry) -> Option<&'a Field> {
        self.target.map(|id| reg.field(id))
    }

    fn update_bit_length(&mut self, common: &FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let reg = p.ctx.registry;
        let Some(target) = self.target_field(reg) else {
            return Ok(());
        };
        let max_bits = target.max_length(reg).saturating_mul(8);
        let Some(v) = p.single(BIT_LENGTH)? else {
            if self.bit_length == 0 {
                self.bit_length = max_bits;
            }
            return Ok(());
        };
        if !common.in_bitfield {
            p.warn(format!(
                "The property \"{}\" is applicable only to the members of \"{}\"",
                BIT_LENGTH,
                Kind::Bitfield.as_str()
            ));
            return Ok(());
        }
        self.bit_length = common::str_to_usize(&v).ok_or_else(|| p.unexpected(BIT_LENGTH, &v))?;
        target
            .validate_bit_length(self.bit_length, reg)
            .map_err(|msg| p.error(msg))
    }
}

impl FieldImpl for RefField {
    fn kind(&self) -> Kind {
        Kind::Ref
    }

    fn extra_props(&self) -> &'static [&'static str] {
        PROPS
    }

    fn parse(&mut self, common: &mut FieldCommon, p: &KindParse<'_>) -> DslResult<()> {
        let Some(reference) = p.single(FIELD)? else {
            if self.target.is_none() {
                return Err(p.structural(format!(
                    "Missing value for mandatory property \"{}\" for \"{}\" element.",
                    FIELD,
                    Kind::Ref.as_str()
                )));
            }
            return Ok(());
        };
        let id = p
            .ctx
            .find_field_id(&reference)
            .ok_or_else(|| p.unexpected(FIELD, &reference))?;
        self.target = Some(id);
        self.update_bit_length(common, p)?;

        let target = p.ctx.registry.field(id);
        if common.name.is_empty() {
            common.name = target.name().to_string();
        }
        if common.display_name.is_empty() {
            common.display_name = target.display_name().to_string();
        }
        if p.supports(Feature::SemanticTypeRefInheritance)
            && common.semantic_type == SemanticType::None
            && target.semantic_type() != SemanticType::MessageId
        {
            common.semantic_type = target.semantic_type();
        }
        Ok(())
    }

    fn min_length(&self, reg: &Registry) -> usize {
        self.target_field(reg).map(|f| f.min_length(reg)).unwrap_or(0)
    }

    fn max_length(&self, reg: &Registry) -> usize {
        self.target_field(reg).map(|f| f.max_length(reg)).unwrap_or(0)
    }

    fn bit_length(&self, common: &FieldCommon, _reg: &Registry) -> usize {
        if common.in_bitfield {
            self.bit_length
        } else {
            0
        }
    }

    fn validate_bit_length(&self, bit_length: usize, reg: &Registry) -> Result<(), String> {
        match self.target_field(reg) {
            Some(f) => f.validate_bit_length(bit_length, reg),
            None => Err("Reference to an unknown field.".to_string()),
        }
    }

    fn str_to_numeric(&self, rest: &str, reg: &Registry) -> Option<i128> {
        self.target_field(reg)?.str_to_numeric(rest, reg)
    }

    fn str_to_bool(&self, rest: &str, reg: &Registry) -> Option<bool> {
        self.target_field(reg)?.str_to_bool(rest, reg)
    }

    fn str_to_string(&self, rest: &str, reg: &Registry) -> Option<String> {
        self.target_field(reg)?.str_to_string(rest, reg)
    }

    fn str_to_data(&self, rest: &str, reg: &Registry) -> Option<Vec<u8>> {
        self.target_field(reg)?.str_to_data(rest, reg)
    }

    fn semantic_type_allowed(&self, ty: SemanticType, ctx: &ParseCtx<'_>) -> bool {
        self.target_field(ctx.registry)
            .map(|f| f.semantic_type() == ty || f.kind.imp().semantic_type_allowed(ty, ctx))
            .unwrap_or(false)
    }

    fn inner_ref<'a>(&'a self, _this: &'a Field, rest: &'a str, reg: &'a Registry) -> FieldRefInfo<'a> {
        match self.target_field(reg) {
            Some(f) => f.process_inner_ref(rest, reg),
            None => FieldRefInfo::invalid(),
        }
    }

    fn valid_ref_type(&self, ty: FieldRefType, reg: &Registry) -> bool {
        self.target_field(reg)
            .map(|f| f.is_valid_ref_type(ty, reg))
            .unwrap_or(false)
    }

    fn comparable_to_value(&self, val: &str, ctx: &ParseCtx<'_>) -> bool {
        self.target_field(ctx.registry)
            .map(|f| f.is_comparable_to_value(val, ctx))
            .unwrap_or(false)
    }

    fn comparable_to_field(&self, other: &Field, reg: &Registry) -> bool {
        self.target_field(reg)
            .map(|f| f.is_comparable_to_field(other, reg))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_ref_has_no_length() {
        let reg = Registry::default();
        let r = RefField::default();
        assert_eq!(r.min_length(&reg), 0);
        assert!(r.validate_bit_length(8, &reg).is_err());
    }
}
