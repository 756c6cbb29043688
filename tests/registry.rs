mod common;

use std::path::Path;

use common::{session, to_bytes};
use qisa_as::error::QmapError;
use qisa_as::Error;

const CUSTOM: &str = "\
def_q_arg_none['qnop']   = 0x00
def_q_arg_st['rx180']    = 0x05
def_q_arg_tt['cphase']   = 0x40
";

#[test]
fn custom_map_drives_assembly_and_disassembly() {
    let mut s = session();
    s.load_qmap(CUSTOM).unwrap();
    let words = s.assemble("BS 1 RX180 S2 | CPHASE T1").unwrap().words.clone();
    assert_eq!(words, vec![0x8284_8009]);
    let listing = s.disassemble(&to_bytes(&words)).unwrap();
    assert_eq!(listing.instructions[0].text, "BS 1 RX180 S2 | CPHASE T1");

    // the built-in gates are gone
    match s.assemble("H S0") {
        Err(Error::Assembly(d)) => assert_eq!(d.to_string(), "1:1: opcode for 'H' not found"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn demo_map_loads_from_file() {
    let mut s = session();
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/surface7.qmap");
    s.load_qmap_file(&path).unwrap();
    assert_eq!(s.assemble("PREPZ S0").unwrap().words, vec![0x8800_0001]);
}

#[test]
fn dump_reads_back_unchanged() {
    let mut s = session();
    s.load_qmap(CUSTOM).unwrap();
    let dump = s.registry().dump_specification();
    assert!(dump.contains("def_opcode['ADD']"));
    assert!(dump.contains("def_q_arg_st['RX180']         = 0x05"));

    let mut other = session();
    other.load_qmap(&dump).unwrap();
    assert_eq!(other.registry().dump_specification(), dump);
}

#[test]
fn rejected_map_leaves_tables_untouched() {
    let mut s = session();
    let err = s.load_qmap("def_q_arg_st['x'] = 3\n").unwrap_err();
    assert!(matches!(err, Error::Qmap(QmapError::MissingFiller)), "{err}");

    let dup = "def_q_arg_none['QNOP'] = 0\ndef_q_arg_st['A'] = 3\ndef_q_arg_tt['B'] = 3\n";
    let err = s.load_qmap(dup).unwrap_err();
    assert!(matches!(err, Error::Qmap(QmapError::DuplicateOpcode { value: 3, .. })), "{err}");

    let err = s.load_qmap("def_q_arg_none['QNOP'] = 0\ndef_q_arg_st['A'] = 0x100\n").unwrap_err();
    assert!(err.to_string().contains("opcode value too high"), "{err}");

    assert!(matches!(s.load_qmap("garbage\n"), Err(Error::Qmap(QmapError::Syntax { line: 1, .. }))));
    assert_eq!(s.assemble("H S0").unwrap().words, vec![0x8100_0001]);
}

#[test]
fn kind_mismatch_names_both_kinds() {
    let errs = common::errors("CZ S0");
    assert_eq!(
        errs,
        vec!["1:1: 'CZ' is a quantum instruction taking a T register, expected a quantum instruction taking an S register"
            .to_string()]
    );
}
