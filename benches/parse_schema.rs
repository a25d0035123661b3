//! Benchmark: parse, validate and prepare a synthetic schema with thousands of
//! fields spread over nested namespaces, messages referencing them and a frame.

use commsdsl::{GenConfig, Generator, Logger, LoggerConfig, Protocol, ProtocolConfig, Severity};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt::Write as _;

const NAMESPACES: usize = 10;
const FIELDS_PER_NS: usize = 300;
const MESSAGES_PER_NS: usize = 20;

fn synthetic_schema() -> String {
    let mut s = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    s.push_str("<schema name=\"bench\" version=\"5\" endian=\"big\">\n");
    s.push_str("  <fields>\n");
    s.push_str("    <enum name=\"MsgId\" type=\"uint16\" semanticType=\"messageId\">\n");
    for n in 0..NAMESPACES {
        for m in 0..MESSAGES_PER_NS {
            let id = n * MESSAGES_PER_NS + m + 1;
            let _ = writeln!(s, "      <validValue name=\"M{}\" val=\"{}\" />", id, id);
        }
    }
    s.push_str("    </enum>\n  </fields>\n");

    for n in 0..NAMESPACES {
        let _ = writeln!(s, "  <ns name=\"ns{}\">", n);
        for f in 0..FIELDS_PER_NS {
            match f % 4 {
                0 => {
                    let _ = writeln!(
                        s,
                        "    <int name=\"F{}\" type=\"uint16\" validRange=\"[0, 1000]\" defaultValue=\"5\" />",
                        f
                    );
                }
                1 => {
                    let _ = writeln!(
                        s,
                        "    <string name=\"F{}\"><lengthPrefix><int name=\"Len\" type=\"uint8\" /></lengthPrefix></string>",
                        f
                    );
                }
                2 => {
                    let _ = writeln!(
                        s,
                        "    <bundle name=\"F{}\"><int name=\"A\" type=\"uint8\" /><ref name=\"B\" field=\"ns{}.F{}\" /></bundle>",
                        f,
                        n,
                        f - 2
                    );
                }
                _ => {
                    let _ = writeln!(
                        s,
                        "    <set name=\"F{}\" length=\"1\"><bit name=\"B0\" idx=\"0\" /><bit name=\"B1\" idx=\"1\" /></set>",
                        f
                    );
                }
            }
        }
        for m in 0..MESSAGES_PER_NS {
            let id = n * MESSAGES_PER_NS + m + 1;
            let _ = writeln!(s, "    <message name=\"Msg{}\" id=\"MsgId.M{}\">", id, id);
            let _ = writeln!(s, "      <ref name=\"A\" field=\"ns{}.F{}\" />", n, (m * 4) % FIELDS_PER_NS);
            let _ = writeln!(s, "      <ref name=\"B\" field=\"ns{}.F{}\" />", n, (m * 4 + 2) % FIELDS_PER_NS);
            s.push_str("    </message>\n");
        }
        s.push_str("  </ns>\n");
    }

    s.push_str("  <frame name=\"Frame\">\n");
    s.push_str("    <sync name=\"Sync\"><int name=\"SyncField\" type=\"uint16\" defaultValue=\"0xabcd\" /></sync>\n");
    s.push_str("    <size name=\"Size\"><int name=\"SizeField\" type=\"uint16\" serOffset=\"2\" /></size>\n");
    s.push_str("    <id name=\"Id\" field=\"MsgId\" />\n");
    s.push_str("    <payload name=\"Data\" />\n");
    s.push_str("    <checksum name=\"Checksum\" alg=\"crc-ccitt\" from=\"Size\"><int name=\"ChecksumField\" type=\"uint16\" /></checksum>\n");
    s.push_str("  </frame>\n");
    s.push_str("</schema>\n");
    s
}

fn quiet_protocol() -> Protocol {
    let config = ProtocolConfig {
        multiple_schemas_enabled: false,
        logger: LoggerConfig {
            min_level: Severity::Error,
            warn_as_err: false,
        },
    };
    Protocol::with_logger(config, Logger::with_callback(config.logger, Box::new(|_, _| {})))
}

fn bench_parse_schema(c: &mut Criterion) {
    let src = synthetic_schema();

    c.bench_function("parse_validate_synthetic_schema", |b| {
        b.iter(|| {
            let mut protocol = quiet_protocol();
            protocol
                .parse_str(black_box(&src), "bench.xml")
                .expect("parse");
            protocol.validate().expect("validate");
            protocol.registry().field_ids().count()
        })
    });

    let mut protocol = quiet_protocol();
    protocol.parse_str(&src, "bench.xml").expect("parse");
    protocol.validate().expect("validate");

    c.bench_function("prepare_generator_tree", |b| {
        b.iter(|| {
            let gen = Generator::prepare(black_box(&protocol), GenConfig::default()).expect("prepare");
            gen.schemas().len()
        })
    });
}

criterion_group!(benches, bench_parse_schema);
criterion_main!(benches);
