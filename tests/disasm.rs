mod common;

use common::{session, to_bytes, words};
use pretty_assertions::assert_eq;
use qisa_as::{DisasmError, Error, ListingFormat, Session, SessionConfig};

const LOOP: &str = "\
start: LDI R1, 3
loop:  SUB R1, R1, R2
       BR NE, loop
       BR ALWAYS, start
       STOP
";

fn disassemble(words: &[u32], format: ListingFormat) -> String {
    let mut s = session();
    s.cfg.format = format;
    s.disassemble(&to_bytes(words)).unwrap();
    s.disassembly_output().unwrap()
}

#[test]
fn loop_compact_listing() {
    let w = words(LOOP);
    assert_eq!(w, vec![0x2c10_0003, 0x3e10_8800, 0x03ff_fffb, 0x03ff_ffd0, 0x1000_0000]);
    let expected = "\
0x2c100003  # label_0: LDI R1, 3
0x3e108800  # label_1: SUB R1, R1, R2
0x03fffffb  #          BR NE, label_1 # offset(-1)
0x03ffffd0  #          BR ALWAYS, label_0 # offset(-3)
0x10000000  #          STOP
";
    assert_eq!(disassemble(&w, ListingFormat::Compact), expected);
}

#[test]
fn loop_aligned_listing() {
    let expected = "\
label_0: LDI R1, 3                          # 0x2c100003
label_1: SUB R1, R1, R2                     # 0x3e108800
         BR NE, label_1 # offset(-1)        # 0x03fffffb
         BR ALWAYS, label_0 # offset(-3)    # 0x03ffffd0
         STOP                               # 0x10000000
";
    assert_eq!(disassemble(&words(LOOP), ListingFormat::Aligned), expected);
}

#[test]
fn label_names_are_padded_to_the_destination_count() {
    let mut src = String::new();
    for n in 0..12 {
        src.push_str(&format!("l{n}: NOP\n"));
    }
    for n in 0..12 {
        src.push_str(&format!("BR ALWAYS, l{n}\n"));
    }
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&words(&src))).unwrap();
    let names: Vec<&str> = listing.labels.values().map(String::as_str).collect();
    let expected: Vec<String> = (0..12).map(|n| format!("label_{n:02}")).collect();
    assert_eq!(names, expected);
    assert_eq!(listing.label_width(), 10);
    assert_eq!(listing.instructions[0].label, "label_00: ");
    assert_eq!(listing.instructions[11].label, "label_11: ");
    assert_eq!(listing.instructions[12].label, " ".repeat(10));
    assert_eq!(listing.instructions[12].text, "BR ALWAYS, label_00 # offset(-12)");
    assert_eq!(listing.instructions[23].text, "BR ALWAYS, label_11 # offset(-12)");

    let compact = listing.render(ListingFormat::Compact);
    assert_eq!(compact.lines().nth(12), Some("0x03ffff40  #           BR ALWAYS, label_00 # offset(-12)"));
}

#[test]
fn format_is_selected_by_id() {
    let mut s = session();
    s.set_format_id(2).unwrap();
    assert_eq!(s.cfg.format, ListingFormat::Aligned);
    assert!(matches!(s.set_format_id(3), Err(Error::BadFormatId(3))));
    assert_eq!(s.cfg.format, ListingFormat::Aligned);
}

#[test]
fn listing_without_branches_has_no_label_column() {
    let w = words("NOP\nADD R1, R2, R3\nSTOP");
    assert_eq!(
        disassemble(&w, ListingFormat::Compact),
        "0x00000000  # NOP\n0x3c110c00  # ADD R1, R2, R3\n0x10000000  # STOP\n"
    );
}

#[test]
fn operand_rendering() {
    let src = "\
NOT R3, R1
CMP R1, R2
LDI R1, -5
LDUI R2, 255
FBR EQ, R7
FMR R1, Q6
QWAIT 10
QWAITR R5
SMIS S0, {0, 2}
SMIT T3, {(2,0), (3,1)}
";
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&words(src))).unwrap();
    let text: Vec<&str> = listing.instructions.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(
        text,
        vec![
            "NOT R3, R1",
            "CMP R1, R2",
            "LDI R1, -5",
            "LDUI R2, 0xff",
            "FBR EQ, R7",
            "FMR R1, Q6",
            "QWAIT 10",
            "QWAITR R5",
            "SMIS S0, {0, 2}",
            "SMIT T3, {(2,0), (3,1)}",
            "SMIT T3, {}",
            "SMIT T3, {}",
        ]
    );
    assert!(!listing.has_errors());
}

#[test]
fn bundles_render_slots_and_hide_filler() {
    let src = "\
BS 2 H S1 | CZ T3
C,X90 S3
BS 0 QNOP
";
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&words(src))).unwrap();
    let text: Vec<&str> = listing.instructions.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(text, vec!["BS 2 H S1 | CZ T3", "BS 1 C,X90 S3", "BS 0 QNOP"]);
}

#[test]
fn undecodable_words_stay_in_the_listing() {
    // unknown classic opcode, then an unknown quantum opcode in slot 0
    let bad_classic = 0x3f << 25;
    let bad_quantum = 0x8000_0000 | (0x7f << 23) | 1;
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&[bad_classic, bad_quantum, 0x1000_0000])).unwrap();
    assert_eq!(listing.len(), 3);
    assert_eq!(listing.instructions[0].text, "<INVALID: unknown opcode: 0x3f>");
    assert_eq!(listing.instructions[1].text, "BS 1 <INVALID QUANTUM OPCODE: 0x7f>");
    assert_eq!(listing.instructions[2].text, "STOP");
    let errs: Vec<(u64, DisasmError)> = listing.errors().map(|(a, e)| (a, e.clone())).collect();
    assert_eq!(
        errs,
        vec![
            (0, DisasmError::UnknownOpcode { opcode: 0x3f }),
            (1, DisasmError::UnknownQuantumOpcode { opcode: 0x7f }),
        ]
    );
}

#[test]
fn memory_instructions_are_not_supported() {
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&[0x0a << 25])).unwrap();
    assert_eq!(listing.instructions[0].text, "<Not yet supported: 'LD'>");
    assert!(!listing.has_errors());
}

#[test]
fn trailing_bytes_are_reported_past_the_last_word() {
    let mut bytes = to_bytes(&[0x1000_0000]);
    bytes.extend_from_slice(&[0xaa, 0xbb]);
    let mut s = session();
    let listing = s.disassemble(&bytes).unwrap();
    assert_eq!(listing.len(), 1);
    let errs: Vec<(u64, DisasmError)> = listing.errors().map(|(a, e)| (a, e.clone())).collect();
    assert_eq!(errs, vec![(1, DisasmError::TrailingBytes { count: 2 })]);
}

#[test]
fn empty_input_is_rejected() {
    let mut s = session();
    assert!(matches!(s.disassemble(&[]), Err(Error::EmptyInput)));
}

#[test]
fn disassembly_works_without_a_topology() {
    let bytes = to_bytes(&words("SMIS S2, {1, 5}\nSMIT T0, {(2,0)}"));
    let mut s = Session::new(SessionConfig::default());
    let listing = s.disassemble(&bytes).unwrap();
    assert_eq!(listing.instructions[0].text, "SMIS S2, {1, 5}");
    assert_eq!(listing.instructions[1].text, "SMIT T0, {}");
}

#[test]
fn assembly_requires_a_topology() {
    let mut s = Session::new(SessionConfig::default());
    assert!(matches!(s.assemble("NOP"), Err(Error::NoTopology)));
}

#[test]
fn demo_program_reassembles_from_its_listing() {
    let source = include_str!("../demos/rabi.qisa");
    let original = words(source);
    let mut s = session();
    let listing = s.disassemble(&to_bytes(&original)).unwrap().clone();
    assert!(!listing.has_errors());

    // Rebuild source from the listing; SMIT chunks past the first carry no pairs.
    let mut rebuilt = String::new();
    let mut skip = 0;
    for i in &listing.instructions {
        if skip > 0 {
            skip -= 1;
            continue;
        }
        let text = i.text.split(" # ").next().unwrap_or_default();
        if text.starts_with("SMIT") {
            skip = 2;
        }
        rebuilt.push_str(&format!("{}{}\n", i.label, text));
    }
    assert_eq!(words(&rebuilt), original);
}

#[test]
fn save_writes_the_last_output() {
    let dir = std::env::temp_dir().join(format!("qisa-as-save-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let mut s = session();
    assert!(matches!(s.save(dir.join("none")), Err(Error::NothingToSave)));

    s.assemble("NOP\nSTOP").unwrap();
    let bin = dir.join("out.bin");
    s.save(&bin).unwrap();
    let bytes = std::fs::read(&bin).unwrap();
    assert_eq!(bytes, to_bytes(&[0, 0x1000_0000]));

    s.disassemble(&bytes).unwrap();
    let lst = dir.join("out.lst");
    s.save(&lst).unwrap();
    assert_eq!(std::fs::read_to_string(&lst).unwrap(), "0x00000000  # NOP\n0x10000000  # STOP\n");
    std::fs::remove_dir_all(&dir).unwrap();
}
