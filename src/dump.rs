//! Text dump of the prepared semantic tree (`commsdsl_check --dump`).
//!
//! One element per line, indented by namespace depth: fields with their kind
//! and serialized length bounds, messages sorted by id, frames with the layer
//! processing order and the back-payload offset.

use std::fmt::Write as _;

use crate::common::MAX_POSSIBLE_LENGTH;
use crate::error::DslResult;
use crate::gen::{GenField, GenFrame, GenInterface, GenMessage, GenSchema, Generator, Visitor};
use crate::namespace::Namespace;
use crate::registry::Registry;

/// Render the whole tree.
pub fn dump(gen: &Generator<'_>) -> DslResult<String> {
    let mut d = Dumper {
        reg: gen.protocol().registry(),
        out: String::new(),
        depth: 0,
        pending_messages: Vec::new(),
    };
    gen.write(&mut d)?;
    Ok(d.out)
}

/// `min..max` in bytes, `min..` when unbounded.
pub fn format_length(min: usize, max: usize) -> String {
    if max == MAX_POSSIBLE_LENGTH {
        format!("{}..", min)
    } else if min == max {
        min.to_string()
    } else {
        format!("{}..{}", min, max)
    }
}

struct Dumper<'r> {
    reg: &'r Registry,
    out: String,
    depth: usize,
    /// Messages of the current namespace, flushed sorted when it closes.
    pending_messages: Vec<Vec<(i128, u32, String)>>,
}

impl Dumper<'_> {
    fn line(&mut self, text: impl AsRef<str>) {
        let _ = writeln!(self.out, "{}{}", "  ".repeat(self.depth), text.as_ref());
    }

    fn field_line(&mut self, f: &GenField<'_>, extra_depth: usize) {
        let field = f.field();
        let mut flags = String::new();
        if f.is_pseudo() {
            flags.push_str(" pseudo");
        }
        if f.fails_on_invalid() {
            flags.push_str(" failOnInvalid");
        }
        let v = field.versions();
        if v.since != 0 {
            let _ = write!(flags, " since={}", v.since);
        }
        if v.is_deprecated() {
            let _ = write!(flags, " deprecated={}", v.deprecated);
        }
        let text = format!(
            "{}{} {} [{}]{}",
            "  ".repeat(extra_depth),
            field.kind().as_str(),
            field.name(),
            format_length(field.min_length(self.reg), field.max_length(self.reg)),
            flags
        );
        self.line(text);
        for m in f.members() {
            self.field_line(m, extra_depth + 1);
        }
    }
}

impl<'p> Visitor<'p> for Dumper<'_> {
    fn schema(&mut self, schema: &GenSchema<'p>) -> DslResult<()> {
        self.line(format!(
            "schema {} version={} minRemoteVersion={}{}",
            schema.name(),
            schema.version(),
            schema.min_remote_version(),
            if schema.version_dependent_code() { " versionDependent" } else { "" }
        ));
        Ok(())
    }

    fn enter_namespace(&mut self, ns: &'p Namespace) -> DslResult<()> {
        self.depth += 1;
        if !ns.is_root() {
            self.line(format!("ns {}", ns.name));
            self.depth += 1;
        }
        self.pending_messages.push(Vec::new());
        Ok(())
    }

    fn leave_namespace(&mut self, ns: &'p Namespace) -> DslResult<()> {
        let mut msgs = self.pending_messages.pop().unwrap_or_default();
        msgs.sort_by_key(|(id, order, _)| (*id, *order));
        for (_, _, text) in msgs {
            self.out.push_str(&text);
        }
        if !ns.is_root() {
            self.depth -= 1;
        }
        self.depth -= 1;
        Ok(())
    }

    fn field(&mut self, field: &GenField<'p>) -> DslResult<()> {
        self.field_line(field, 0);
        Ok(())
    }

    fn interface(&mut self, iface: &GenInterface<'p>) -> DslResult<()> {
        let suffix = if iface.is_default() { " (default)" } else { "" };
        self.line(format!("interface {}{}", iface.name(), suffix));
        for f in iface.fields() {
            self.field_line(f, 1);
        }
        Ok(())
    }

    fn message(&mut self, msg: &GenMessage<'p>) -> DslResult<()> {
        let m = msg.message();
        let saved = std::mem::take(&mut self.out);
        self.line(format!(
            "message {} id={} [{}]",
            m.name,
            m.id,
            format_length(m.min_length(self.reg), m.max_length(self.reg))
        ));
        for f in msg.fields() {
            self.field_line(f, 1);
        }
        let text = std::mem::replace(&mut self.out, saved);
        if let Some(list) = self.pending_messages.last_mut() {
            list.push((m.id, m.order, text));
        }
        Ok(())
    }

    fn frame(&mut self, frame: &GenFrame<'p>) -> DslResult<()> {
        let f = frame.frame();
        self.line(format!(
            "frame {} backPayloadOffset={}",
            f.name,
            f.back_payload_offset(self.reg)
        ));
        let ordered = frame.ordered_layers().unwrap_or_default();
        for l in ordered {
            let layer = l.layer();
            let field = l
                .field()
                .map(|gf| format!(" {}", gf.field().kind().as_str()))
                .unwrap_or_default();
            let pseudo = if layer.is_pseudo_version(self.reg) { " pseudoVersion" } else { "" };
            self.line(format!("  {} {}{}{}", layer.kind().as_str(), layer.name, field, pseudo));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_formatting() {
        assert_eq!(format_length(2, 2), "2");
        assert_eq!(format_length(1, 5), "1..5");
        assert_eq!(format_length(0, MAX_POSSIBLE_LENGTH), "0..");
    }
}
