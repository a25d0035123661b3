//! Parse schema documents into a light element tree using PEST.
//!
//! Only what schema files need is kept: element names, attributes, text and the
//! line each element starts on (used for `file:line:` diagnostic prefixes).

use crate::error::DslError;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;
use std::sync::Arc;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct XmlParser;

/// Location of an element inside a schema file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SrcPos {
    pub file: Arc<str>,
    pub line: usize,
}

impl fmt::Display for SrcPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: ", self.file, self.line)
    }
}

/// One element of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Concatenated character data (text and CDATA), entities decoded.
    pub text: String,
    pub pos: SrcPos,
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlNode> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn children_in<'a, 'n>(&'a self, names: &'n [&'n str]) -> impl Iterator<Item = &'a XmlNode> + 'n
    where
        'a: 'n,
    {
        self.children
            .iter()
            .filter(move |c| names.contains(&c.name.as_str()))
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|c| c.name == name)
    }

    /// Text content, only when the element holds no child elements.
    pub fn own_text(&self) -> &str {
        if self.children.is_empty() {
            self.text.as_str()
        } else {
            ""
        }
    }

    /// `file:line: ` prefix for diagnostics.
    pub fn log_prefix(&self) -> String {
        self.pos.to_string()
    }
}

/// Parse a whole document; returns the root element.
pub fn parse_document(source: &str, file: &str) -> Result<XmlNode, DslError> {
    let pairs = XmlParser::parse(Rule::document, source)
        .map_err(|e| DslError::Syntax(format!("{}: {}", file, e)))?;
    let doc = pairs
        .into_iter()
        .next()
        .ok_or_else(|| DslError::Syntax(format!("{}: empty document", file)))?;
    let file: Arc<str> = Arc::from(file);
    let root = doc
        .into_inner()
        .find(|p| p.as_rule() == Rule::element)
        .ok_or_else(|| DslError::Syntax(format!("{}: no root element", file)))?;
    build_element(root, &file)
}

fn build_element(pair: pest::iterators::Pair<Rule>, file: &Arc<str>) -> Result<XmlNode, DslError> {
    let line = pair.as_span().start_pos().line_col().0;
    let mut node = XmlNode {
        name: String::new(),
        attrs: Vec::new(),
        children: Vec::new(),
        text: String::new(),
        pos: SrcPos {
            file: file.clone(),
            line,
        },
    };

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::name => node.name = inner.as_str().to_string(),
            Rule::attribute => {
                let mut it = inner.into_inner();
                let name = it
                    .next()
                    .ok_or_else(|| syntax(&node, "attribute without name"))?
                    .as_str()
                    .to_string();
                let raw = it.next().map(|p| p.as_str()).unwrap_or("");
                if node.attrs.iter().any(|(n, _)| *n == name) {
                    return Err(syntax(&node, &format!("duplicate attribute \"{}\"", name)));
                }
                node.attrs.push((name, decode_entities(raw)));
            }
            Rule::element => node.children.push(build_element(inner, file)?),
            Rule::text => node.text.push_str(&decode_entities(inner.as_str())),
            Rule::cdata => {
                if let Some(t) = inner.into_inner().next() {
                    node.text.push_str(t.as_str());
                }
            }
            Rule::close_tag => {
                let close = inner
                    .into_inner()
                    .next()
                    .map(|p| p.as_str())
                    .unwrap_or("");
                if close != node.name {
                    return Err(syntax(
                        &node,
                        &format!("closing tag \"{}\" does not match \"{}\"", close, node.name),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(node)
}

fn syntax(node: &XmlNode, msg: &str) -> DslError {
    DslError::Syntax(format!("{}{}", node.log_prefix(), msg))
}

/// Replace the predefined entities and numeric character references.
/// Unknown entities are kept verbatim.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = match tail.find(';') {
            Some(i) => i,
            None => {
                out.push_str(tail);
                return out;
            }
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                    u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok().and_then(char::from_u32)
                } else {
                    None
                }
            }
        };
        match decoded {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_lines() {
        let src = "<?xml version=\"1.0\"?>\n<schema name=\"S\">\n  <fields>\n    <int name='A' type=\"uint8\"/>\n  </fields>\n</schema>\n";
        let root = parse_document(src, "a.xml").expect("parse");
        assert_eq!(root.name, "schema");
        assert_eq!(root.attr("name"), Some("S"));
        assert_eq!(root.pos.line, 2);
        let fields = &root.children[0];
        assert_eq!(fields.name, "fields");
        let int = &fields.children[0];
        assert_eq!(int.attr("type"), Some("uint8"));
        assert_eq!(int.pos.line, 4);
        assert_eq!(int.log_prefix(), "a.xml:4: ");
    }

    #[test]
    fn text_cdata_and_entities() {
        let src = "<a><description>x &lt; y &amp;&#65;</description><b><![CDATA[<raw>]]></b></a>";
        let root = parse_document(src, "t.xml").expect("parse");
        assert_eq!(root.children[0].own_text(), "x < y &A");
        assert_eq!(root.children[1].own_text(), "<raw>");
    }

    fn named<'a>(node: &'a XmlNode, name: &str) -> Vec<&'a XmlNode> {
        node.children_named(name).collect()
    }

    #[test]
    fn children_outlive_the_looked_up_name() {
        let root = parse_document("<a><b n='1'/><c/><b n='2'/></a>", "t.xml").expect("parse");
        let found = named(&root, &String::from("b"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].attr("n"), Some("2"));

        let names = vec!["c", "b"];
        let picked: Vec<&XmlNode> = root.children_in(&names).collect();
        drop(names);
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn comments_are_skipped() {
        let src = "<!-- head --><a><!-- inner --><b/></a><!-- tail -->";
        let root = parse_document(src, "t.xml").expect("parse");
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn mismatched_close_tag_fails() {
        let err = parse_document("<a><b></c></a>", "t.xml").unwrap_err();
        assert!(matches!(err, DslError::Syntax(_)));
    }

    #[test]
    fn duplicate_attribute_fails() {
        assert!(parse_document("<a x='1' x='2'/>", "t.xml").is_err());
    }

    #[test]
    fn garbage_is_a_syntax_error() {
        assert!(parse_document("not xml", "t.xml").is_err());
        assert!(parse_document("", "t.xml").is_err());
    }
}
