//! Schema documents: top-level properties, platforms and DSL feature gates.

use crate::common::{self, Endian};
use crate::diag::Logger;
use crate::error::DslError;
use crate::props::{self, Extra, Props};
use crate::registry::NamespaceId;
use crate::xml::{SrcPos, XmlNode};

/// Highest `dslVersion` this front end understands.
pub const MAX_DSL_VERSION: u32 = 7;

pub const ID: &str = "id";
pub const VERSION: &str = "version";
pub const DSL_VERSION: &str = "dslVersion";
pub const ENDIAN: &str = "endian";
pub const NON_UNIQUE_MSG_ID_ALLOWED: &str = "nonUniqueMsgIdAllowed";
pub const PLATFORM: &str = "platform";
pub const PLATFORMS: &str = "platforms";

const PROP_NAMES: &[&str] = &[
    props::NAME,
    props::DISPLAY_NAME,
    ID,
    VERSION,
    DSL_VERSION,
    ENDIAN,
    props::DESCRIPTION,
    NON_UNIQUE_MSG_ID_ALLOWED,
];

/// Language features introduced by later DSL versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    FieldValueReference,
    SemanticTypeLength,
    SemanticTypeRefInheritance,
    NonUniqueSpecials,
    FieldAlias,
    CopyFieldsFromBundle,
    OverrideType,
    NonIntSemanticTypeLength,
    MemberReplace,
    MultiSchema,
    InterfaceFieldReference,
    FailOnInvalidInMessage,
    SizeCompInConditionals,
    ExistsCheckInConditionals,
    ValidValueInStringAndData,
    ValidateMinLength,
    MessageReuse,
    ValidCondInCompositeFields,
    /// `displayName` of namespaces and frame layers.
    ElementDisplayName,
}

impl Feature {
    pub fn min_dsl_version(self) -> u32 {
        match self {
            Feature::FieldValueReference
            | Feature::SemanticTypeLength
            | Feature::SemanticTypeRefInheritance
            | Feature::NonUniqueSpecials => 2,
            Feature::FieldAlias => 3,
            Feature::CopyFieldsFromBundle | Feature::OverrideType => 4,
            Feature::NonIntSemanticTypeLength | Feature::MemberReplace | Feature::MultiSchema => 5,
            Feature::InterfaceFieldReference
            | Feature::FailOnInvalidInMessage
            | Feature::SizeCompInConditionals
            | Feature::ExistsCheckInConditionals => 6,
            Feature::ValidValueInStringAndData
            | Feature::ValidateMinLength
            | Feature::MessageReuse
            | Feature::ValidCondInCompositeFields
            | Feature::ElementDisplayName => 7,
        }
    }
}

/// DSL version since which a property is accepted (properties not listed are
/// always accepted).
fn property_min_dsl_version(name: &str) -> Option<u32> {
    let v = match name {
        "validateMinLength" | "defaultValidValue" | "availableLengthLimit" => 4,
        "copyCodeFrom" | "semanticLayerType" | "checksumFrom" | "checksumUntil" | "termSuffix"
        | "missingOnReadFail" | "missingOnInvalid" | "reuseCode" => 5,
        "validCond" => 6,
        "fixedValue" | "copyValidCondFrom" => 7,
        _ => return None,
    };
    Some(v)
}

fn property_deprecated_dsl_version(name: &str) -> Option<u32> {
    match name {
        "displayReadOnly" | "displayHidden" | "displaySpecials" | "displayExtModeCtrl"
        | "displayIdxReadOnlyHidden" => Some(7),
        _ => None,
    }
}

/// Properties of the `<schema>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaProps {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub id: u32,
    pub version: u32,
    pub dsl_version: u32,
    pub endian: Endian,
    pub non_unique_msg_id_allowed: bool,
}

impl SchemaProps {
    fn supports_dsl(&self, min: u32) -> bool {
        self.dsl_version == 0 || min <= self.dsl_version
    }

    /// A `dslVersion` of 0 enables everything.
    pub fn supports(&self, feature: Feature) -> bool {
        self.supports_dsl(feature.min_dsl_version())
    }

    pub fn property_supported(&self, name: &str) -> bool {
        property_min_dsl_version(name)
            .map(|v| self.supports_dsl(v))
            .unwrap_or(true)
    }

    pub fn property_deprecated(&self, name: &str) -> bool {
        match property_deprecated_dsl_version(name) {
            Some(v) => self.dsl_version != 0 && v <= self.dsl_version,
            None => false,
        }
    }
}

/// One schema: the merge of every document declaring the same name.
#[derive(Debug, Clone)]
pub struct Schema {
    pub props: SchemaProps,
    /// Raw property values as written, compared when documents are merged.
    pub raw_props: Vec<(String, String)>,
    pub extra: Extra,
    pub platforms: Vec<String>,
    /// The default (unnamed) namespace holding every other one.
    pub root: NamespaceId,
    pub pos: SrcPos,
}

impl Schema {
    pub fn name(&self) -> &str {
        &self.props.name
    }

    /// Add a platform keeping the list sorted; false when already present.
    pub fn add_platform(&mut self, name: &str) -> bool {
        match self.platforms.binary_search_by(|p| p.as_str().cmp(name)) {
            Ok(_) => false,
            Err(pos) => {
                self.platforms.insert(pos, name.to_string());
                true
            }
        }
    }
}

/// Children of `<schema>` that are neither properties nor namespace content.
pub fn platform_children() -> &'static [&'static str] {
    &[PLATFORM, PLATFORMS]
}

/// Parsed `<schema>` header, before it is merged into the protocol.
#[derive(Debug, Clone)]
pub struct SchemaHeader {
    pub props: SchemaProps,
    pub raw_props: Vec<(String, String)>,
    pub extra: Extra,
    pub pos: SrcPos,
}

fn invalid_value(logger: &Logger, node: &XmlNode, name: &str) -> DslError {
    props::structural(
        logger,
        &node.pos,
        format!(
            "Invalid value of \"{}\" property for \"{}\" element.",
            name, node.name
        ),
    )
}

/// Parse the properties of a `<schema>` element. `content_children` are the
/// element names the namespace parser will consume.
pub fn parse_header(
    node: &XmlNode,
    content_children: &[&str],
    logger: &Logger,
) -> Result<SchemaHeader, DslError> {
    let p = Props::new(node, PROP_NAMES);
    let mut raw_props = Vec::new();
    let mut get = |name: &str| -> Result<Option<String>, DslError> {
        let v = p.single(name, logger)?;
        if let Some(v) = &v {
            raw_props.push((name.to_string(), v.clone()));
        }
        Ok(v)
    };

    let mut sp = SchemaProps::default();
    if let Some(v) = get(props::NAME)? {
        sp.name = v;
    }
    if let Some(v) = get(props::DESCRIPTION)? {
        sp.description = v;
    }
    for (name, slot) in [
        (ID, &mut sp.id),
        (VERSION, &mut sp.version),
        (DSL_VERSION, &mut sp.dsl_version),
    ] {
        if let Some(v) = get(name)? {
            *slot = common::str_to_unsigned(&v).ok_or_else(|| invalid_value(logger, node, name))?;
        }
    }
    if let Some(v) = get(ENDIAN)? {
        sp.endian =
            common::parse_endian(&v, Endian::Little).ok_or_else(|| invalid_value(logger, node, ENDIAN))?;
    }
    if let Some(v) = get(NON_UNIQUE_MSG_ID_ALLOWED)? {
        sp.non_unique_msg_id_allowed =
            common::str_to_bool(&v).ok_or_else(|| invalid_value(logger, node, NON_UNIQUE_MSG_ID_ALLOWED))?;
    }
    if let Some(v) = get(props::DISPLAY_NAME)? {
        if 0 < sp.dsl_version && sp.dsl_version < 7 {
            props::warn(
                logger,
                &node.pos,
                format!(
                    "The property \"{}\" of schema is not supported for dslVersion={}.",
                    props::DISPLAY_NAME,
                    sp.dsl_version
                ),
            );
        } else {
            sp.display_name = v;
        }
    }

    if !sp.name.is_empty() && !common::is_valid_name(&sp.name) {
        return Err(props::structural(
            logger,
            &node.pos,
            format!(
                "Property \"{}\" has unexpected value ({}).",
                props::NAME,
                sp.name
            ),
        ));
    }

    if MAX_DSL_VERSION < sp.dsl_version {
        return Err(props::semantic(
            logger,
            &node.pos,
            format!(
                "Required DSL version is too big ({}), maximum supported is {}.",
                sp.dsl_version, MAX_DSL_VERSION
            ),
        ));
    }

    let mut children: Vec<&str> = content_children.to_vec();
    children.extend_from_slice(platform_children());
    let extra = p.check_unknown(&[PROP_NAMES], &children, logger)?;

    Ok(SchemaHeader {
        props: sp,
        raw_props,
        extra,
        pos: node.pos.clone(),
    })
}

/// Collect `<platform>` declarations, directly or grouped in `<platforms>`.
pub fn parse_platforms(
    root: &XmlNode,
    schema: &mut Schema,
    logger: &Logger,
) -> Result<(), DslError> {
    let mut nodes = Vec::new();
    for group in root.children_named(PLATFORMS) {
        for c in &group.children {
            if c.name != PLATFORM {
                return Err(props::structural(
                    logger,
                    &c.pos,
                    format!("Unexpected element, \"{}\" is expected.", PLATFORM),
                ));
            }
            nodes.push(c);
        }
    }
    nodes.extend(root.children_named(PLATFORM));

    for node in nodes {
        let p = Props::new(node, &[props::NAME]);
        let Some(name) = p.single(props::NAME, logger)? else {
            return Err(props::structural(
                logger,
                &node.pos,
                format!("Required property \"{}\" is not defined.", props::NAME),
            ));
        };
        if name.contains(['+', '-', ',']) {
            return Err(props::structural(
                logger,
                &node.pos,
                format!("Invalid platform name ({}).", name),
            ));
        }
        if !schema.add_platform(&name) {
            props::warn(
                logger,
                &node.pos,
                format!("Platform \"{}\" defined more than once.", name),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::LoggerConfig;
    use crate::xml::parse_document;

    #[test]
    fn feature_gates() {
        let mut props = SchemaProps::default();
        assert!(props.supports(Feature::MessageReuse));
        props.dsl_version = 4;
        assert!(props.supports(Feature::OverrideType));
        assert!(!props.supports(Feature::MemberReplace));
        assert!(props.property_supported("validateMinLength"));
        assert!(!props.property_supported("copyCodeFrom"));
        assert!(props.property_supported("name"));
        assert!(!props.property_deprecated("displayHidden"));
        props.dsl_version = 7;
        assert!(props.property_deprecated("displayHidden"));
    }

    #[test]
    fn header() {
        let node = parse_document(
            "<schema name='P' id='1' version='5' endian='big' x.y='1'/>",
            "s.xml",
        )
        .expect("parse");
        let logger = Logger::default();
        let h = parse_header(&node, &[], &logger).expect("header");
        assert_eq!(h.props.name, "P");
        assert_eq!(h.props.version, 5);
        assert_eq!(h.props.endian, Endian::Big);
        assert_eq!(h.extra.attrs.len(), 1);
    }

    #[test]
    fn dsl_version_too_big() {
        let node = parse_document("<schema name='P' dslVersion='8'/>", "s.xml").expect("parse");
        let (logger, store) = Logger::capturing(LoggerConfig::default());
        assert!(parse_header(&node, &[], &logger).is_err());
        assert!(store.borrow()[0].message.contains("Required DSL version is too big"));
    }
}
