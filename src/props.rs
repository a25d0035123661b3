//! Property access over schema elements.
//!
//! A property may be written either as an attribute or as a child element whose
//! value is its `value` attribute or its text. [`Props`] merges both spellings
//! and keeps the origin of every value so diagnostics point at the right line.

use crate::diag::Logger;
use crate::error::DslError;
use crate::xml::{SrcPos, XmlNode};
use crate::common;
use crate::version::{VersionWindow, NOT_YET_DEPRECATED};

pub const NAME: &str = "name";
pub const DISPLAY_NAME: &str = "displayName";
pub const DESCRIPTION: &str = "description";
pub const SINCE_VERSION: &str = "sinceVersion";
pub const DEPRECATED: &str = "deprecated";
pub const REMOVED: &str = "removed";

/// Where a property value came from.
#[derive(Debug, Clone, Copy)]
pub enum PropSource<'a> {
    Attr(&'a str),
    Child(&'a XmlNode),
}

/// Log `msg` as an error prefixed with the element position and turn it into a
/// structural error.
pub fn structural(logger: &Logger, pos: &SrcPos, msg: impl AsRef<str>) -> DslError {
    let text = format!("{}{}", pos, msg.as_ref());
    logger.error(&text);
    DslError::Structural(text)
}

/// Same as [`structural`] for semantic failures.
pub fn semantic(logger: &Logger, pos: &SrcPos, msg: impl AsRef<str>) -> DslError {
    let text = format!("{}{}", pos, msg.as_ref());
    logger.error(&text);
    DslError::Semantic(text)
}

pub fn warn(logger: &Logger, pos: &SrcPos, msg: impl AsRef<str>) {
    logger.warning(format!("{}{}", pos, msg.as_ref()));
}

pub fn unexpected_value(
    logger: &Logger,
    node: &XmlNode,
    prop: &str,
    value: &str,
) -> DslError {
    structural(
        logger,
        &node.pos,
        format!(
            "Property \"{}\" of element \"{}\" has unexpected value ({}).",
            prop, node.name, value
        ),
    )
}

/// Properties of one element.
#[derive(Debug, Clone)]
pub struct Props<'a> {
    node: &'a XmlNode,
    entries: Vec<(&'a str, PropSource<'a>)>,
}

impl<'a> Props<'a> {
    /// Collect the element attributes plus the children named in `child_props`.
    pub fn new(node: &'a XmlNode, child_props: &[&str]) -> Self {
        let mut entries: Vec<(&'a str, PropSource<'a>)> = node
            .attrs
            .iter()
            .map(|(n, v)| (n.as_str(), PropSource::Attr(v.as_str())))
            .collect();
        for c in &node.children {
            if child_props.contains(&c.name.as_str()) {
                entries.push((c.name.as_str(), PropSource::Child(c)));
            }
        }
        Props { node, entries }
    }

    /// Like [`Props::new`], plus children named in `possible` that carry a plain
    /// value. Such children may instead hold a nested element definition, in
    /// which case they are left to the caller.
    pub fn with_possible(node: &'a XmlNode, child_props: &[&str], possible: &[&str]) -> Self {
        let mut props = Props::new(node, child_props);
        for c in &node.children {
            if possible.contains(&c.name.as_str()) && c.children.is_empty() {
                props.entries.push((c.name.as_str(), PropSource::Child(c)));
            }
        }
        props
    }

    pub fn node(&self) -> &'a XmlNode {
        self.node
    }

    pub fn pos(&self) -> &'a SrcPos {
        &self.node.pos
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.entries.iter().filter(|(n, _)| *n == name).count()
    }

    pub fn sources(&self, name: &str) -> Vec<PropSource<'a>> {
        self.entries
            .iter()
            .filter(|(n, _)| *n == name)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Every value of a property, in document order.
    pub fn values(&self, name: &str, logger: &Logger) -> Result<Vec<String>, DslError> {
        self.sources(name)
            .into_iter()
            .map(|s| source_value(s, logger))
            .collect()
    }

    /// Value of a property that may appear at most once.
    pub fn single(&self, name: &str, logger: &Logger) -> Result<Option<String>, DslError> {
        let sources = self.sources(name);
        if 1 < sources.len() {
            return Err(structural(
                logger,
                self.pos(),
                format!(
                    "Too many values of \"{}\" property for \"{}\" element.",
                    name, self.node.name
                ),
            ));
        }
        match sources.first() {
            Some(s) => source_value(*s, logger).map(Some),
            None => Ok(None),
        }
    }

    pub fn required(&self, name: &str, logger: &Logger) -> Result<String, DslError> {
        match self.single(name, logger)? {
            Some(v) => Ok(v),
            None => Err(structural(
                logger,
                self.pos(),
                format!(
                    "Missing value for mandatory property \"{}\" for \"{}\" element.",
                    name, self.node.name
                ),
            )),
        }
    }

    pub fn bool_prop(&self, name: &str, logger: &Logger) -> Result<Option<bool>, DslError> {
        match self.single(name, logger)? {
            None => Ok(None),
            Some(v) => match common::str_to_bool(&v) {
                Some(b) => Ok(Some(b)),
                None => Err(unexpected_value(logger, self.node, name, &v)),
            },
        }
    }

    pub fn unsigned_prop(&self, name: &str, logger: &Logger) -> Result<Option<u32>, DslError> {
        match self.single(name, logger)? {
            None => Ok(None),
            Some(v) => match common::str_to_unsigned(&v) {
                Some(n) => Ok(Some(n)),
                None => Err(unexpected_value(logger, self.node, name, &v)),
            },
        }
    }

    /// Reject attributes and children outside the allowed lists. Names containing
    /// a dot are treated as extra data and returned instead.
    pub fn check_unknown(
        &self,
        props: &[&[&str]],
        children: &[&str],
        logger: &Logger,
    ) -> Result<Extra, DslError> {
        let known = |n: &str| props.iter().any(|list| list.contains(&n));
        let mut extra = Extra::default();
        for (name, value) in &self.node.attrs {
            if known(name) {
                continue;
            }
            if name.contains('.') {
                extra.attrs.push((name.clone(), value.clone()));
                continue;
            }
            return Err(structural(
                logger,
                self.pos(),
                format!("Unexpected attribute \"{}\" of \"{}\" element.", name, self.node.name),
            ));
        }
        for c in &self.node.children {
            if known(&c.name) || children.contains(&c.name.as_str()) {
                continue;
            }
            if c.name.contains('.') {
                extra.children.push(c.clone());
                continue;
            }
            return Err(structural(
                logger,
                &c.pos,
                format!("Unexpected element \"{}\" inside \"{}\".", c.name, self.node.name),
            ));
        }
        Ok(extra)
    }
}

/// Pass-through attributes and elements kept for external tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extra {
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl Extra {
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty() && self.children.is_empty()
    }
}

fn source_value(source: PropSource<'_>, logger: &Logger) -> Result<String, DslError> {
    match source {
        PropSource::Attr(v) => Ok(v.trim().to_string()),
        PropSource::Child(node) => node_value(node, logger),
    }
}

/// Value carried by an element: its `value` attribute or its text, never both.
pub fn node_value(node: &XmlNode, logger: &Logger) -> Result<String, DslError> {
    let attr = node.attr("value").map(str::trim).unwrap_or("");
    let text = node.own_text().trim();
    if !attr.is_empty() && !text.is_empty() {
        return Err(structural(
            logger,
            &node.pos,
            format!("Incorrect value format for \"{}\" element.", node.name),
        ));
    }
    if !attr.is_empty() {
        return Ok(attr.to_string());
    }
    Ok(common::normalise_string(text))
}

/// Read `sinceVersion`/`deprecated`/`removed` and check them against the parent
/// window and the schema version.
pub fn get_and_check_versions(
    props: &Props<'_>,
    parent: VersionWindow,
    schema_version: u32,
    logger: &Logger,
) -> Result<VersionWindow, DslError> {
    let node = props.node();
    let mut window = VersionWindow {
        removed: false,
        ..parent
    };
    if let Some(v) = props.single(SINCE_VERSION, logger)? {
        window.since =
            common::str_to_unsigned(&v).ok_or_else(|| unexpected_value(logger, node, SINCE_VERSION, &v))?;
    }
    if let Some(v) = props.single(DEPRECATED, logger)? {
        window.deprecated =
            common::str_to_unsigned(&v).ok_or_else(|| unexpected_value(logger, node, DEPRECATED, &v))?;
    }
    if let Some(removed) = props.bool_prop(REMOVED, logger)? {
        window.removed = removed;
    }
    check_versions(node, window, parent, schema_version, logger)?;
    Ok(window)
}

pub fn check_versions(
    node: &XmlNode,
    window: VersionWindow,
    parent: VersionWindow,
    schema_version: u32,
    logger: &Logger,
) -> Result<(), DslError> {
    let fail = |msg: String| Err(semantic(logger, &node.pos, msg));
    if schema_version < window.since {
        return fail(format!(
            "The value of \"{}\" property ({}) cannot be greater than value of \"version\" property of the schema ({}).",
            SINCE_VERSION, window.since, schema_version
        ));
    }
    if window.since < parent.since {
        return fail(format!(
            "The value of \"{}\" property ({}) cannot be less than {}.",
            SINCE_VERSION, window.since, parent.since
        ));
    }
    if parent.deprecated <= window.since {
        return fail(format!(
            "The value of \"{}\" property ({}) must be less than {}.",
            SINCE_VERSION, window.since, parent.deprecated
        ));
    }
    if parent.deprecated < window.deprecated {
        return fail(format!(
            "The value of \"{}\" property ({}) cannot be greater than {}.",
            DEPRECATED, window.deprecated, parent.deprecated
        ));
    }
    if window.deprecated <= window.since {
        return fail(format!(
            "The value of \"{}\" property ({}) must be greater than value of \"{}\" property ({}).",
            DEPRECATED, window.deprecated, SINCE_VERSION, window.since
        ));
    }
    if window.deprecated < NOT_YET_DEPRECATED && schema_version < window.deprecated {
        return fail(format!(
            "The value of \"{}\" property ({}) cannot be greater than value of \"version\" property of the schema ({}).",
            DEPRECATED, window.deprecated, schema_version
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::LoggerConfig;
    use crate::xml::parse_document;

    fn node(src: &str) -> XmlNode {
        parse_document(src, "p.xml").expect("parse")
    }

    #[test]
    fn attribute_and_child_values() {
        let n = node("<int name=' A '><description value='d'/><displayName>Nice\n  name</displayName></int>");
        let logger = Logger::default();
        let props = Props::new(&n, &[DESCRIPTION, DISPLAY_NAME]);
        assert_eq!(props.single(NAME, &logger).expect("name"), Some("A".to_string()));
        assert_eq!(props.required(DESCRIPTION, &logger).expect("d"), "d");
        assert_eq!(
            props.single(DISPLAY_NAME, &logger).expect("dn"),
            Some("Nice name".to_string())
        );
    }

    #[test]
    fn duplicate_and_missing() {
        let n = node("<int name='A'><name value='B'/></int>");
        let (logger, store) = Logger::capturing(LoggerConfig::default());
        let props = Props::new(&n, &[NAME]);
        assert!(props.single(NAME, &logger).is_err());
        assert!(store.borrow()[0].message.contains("Too many values of \"name\""));
        assert!(props.required("type", &logger).is_err());
    }

    #[test]
    fn value_and_text_conflict() {
        let n = node("<int><name value='B'>C</name></int>");
        let logger = Logger::default();
        let props = Props::new(&n, &[NAME]);
        assert!(props.single(NAME, &logger).is_err());
    }

    #[test]
    fn unknown_props() {
        let n = node("<int name='A' foo='1' x.y='2'><cc.data/></int>");
        let logger = Logger::default();
        let props = Props::new(&n, &[]);
        assert!(props.check_unknown(&[&[NAME]], &[], &logger).is_err());
        let extra = props
            .check_unknown(&[&[NAME, "foo"]], &[], &logger)
            .expect("extra");
        assert_eq!(extra.attrs, vec![("x.y".to_string(), "2".to_string())]);
        assert_eq!(extra.children.len(), 1);
    }

    #[test]
    fn version_checks() {
        let logger = Logger::default();
        let n = node("<int sinceVersion='2' deprecated='4' removed='true'/>");
        let props = Props::new(&n, &[]);
        let w = get_and_check_versions(&props, VersionWindow::default(), 5, &logger).expect("versions");
        assert_eq!(w, VersionWindow::new(2, 4, true));

        assert!(get_and_check_versions(&props, VersionWindow::default(), 1, &logger).is_err());
        assert!(get_and_check_versions(&props, VersionWindow::new(3, NOT_YET_DEPRECATED, false), 5, &logger).is_err());
        assert!(get_and_check_versions(&props, VersionWindow::new(0, 3, false), 5, &logger).is_err());

        let n = node("<int sinceVersion='3' deprecated='3'/>");
        let props = Props::new(&n, &[]);
        assert!(get_and_check_versions(&props, VersionWindow::default(), 5, &logger).is_err());
    }
}
