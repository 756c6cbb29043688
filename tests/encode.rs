mod common;

use common::{errors, words};

#[test]
fn classic_register_forms() {
    assert_eq!(words("ADD R1, R2, R3"), vec![0x3c11_0c00]);
    assert_eq!(words("NOT R1, R2"), vec![0x3610_0800]);
    assert_eq!(words("CMP R1, R2"), vec![0x1a00_8800]);
    assert_eq!(words("QWAITR R5"), vec![0x7002_8000]);
    assert_eq!(words("nop\nstop"), vec![0x0000_0000, 0x1000_0000]);
}

#[test]
fn immediates() {
    assert_eq!(words("LDI R1, -5"), vec![0x2c1f_fffb]);
    // rd is mirrored into the rs field
    assert_eq!(words("LDUI R2, 0x7fff"), vec![0x2e21_7fff]);
    assert_eq!(words("QWAIT 10"), vec![0x6000_000a]);
    assert_eq!(words(".def_sym N 10\nQWAIT N"), vec![0x6000_000a]);
}

#[test]
fn fetch_instructions() {
    assert_eq!(words("FBR EQ, R7"), vec![0x2870_000a]);
    assert_eq!(words("FMR R1, Q6"), vec![0x2a10_0006]);
}

#[test]
fn alias_expansions() {
    assert_eq!(words("SHL1 R1, R2"), words("ADD R1, R2, R2"));
    assert_eq!(words("MULT2 R1, R2"), words("ADD R1, R2, R2"));
    assert_eq!(words("COPY R4, R5"), words("OR R4, R5, R5"));
    assert_eq!(words("MOV R4, R5"), words("OR R4, R5, R5"));
    assert_eq!(words("NAND R1, R2, R3"), words("AND R1, R2, R3\nNOT R1, R1"));
    assert_eq!(words("NOR R1, R2, R3"), words("OR R1, R2, R3\nNOT R1, R1"));
    assert_eq!(words("XNOR R1, R2, R3"), words("XOR R1, R2, R3\nNOT R1, R1"));
    assert_eq!(words("x: BRA x"), words("x: BR ALWAYS, x"));
    assert_eq!(words("x: GOTO x"), words("x: BR ALWAYS, x"));
    assert_eq!(words("x: BRN x"), words("x: BR NEVER, x"));
}

#[test]
fn mov_immediate_splits_when_needed() {
    assert_eq!(words("MOV R3, 1000"), words("LDI R3, 1000"));
    assert_eq!(words("MOV R3, 0x12345678"), vec![0x2c30_5678, 0x2e31_891a]);
    assert_eq!(words("MOV R1, -1000000"), words("LDI R1, 0xbdc0\nLDUI R1, 0x7ff8"));
    assert_eq!(
        errors("MOV R1, 0x80000000"),
        vec!["1:9: imm (2147483648) too large, min=-2147483647, max=2147483647".to_string()]
    );
}

#[test]
fn register_aliases() {
    let src = ".register R7, acc\n.register S4 q\nADD acc, acc, R1\nBS 1 H q";
    assert_eq!(words(src), vec![0x3c73_8400, 0x8108_0001]);
    assert_eq!(errors("FMR R1, Q7"), vec!["1:9: Q register nr (7) too high, max=6".to_string()]);
}

#[test]
fn s_mask() {
    assert_eq!(words("SMIS S0, {0, 2}"), vec![0x4000_0005]);
    assert_eq!(words("SMIS S0, 5"), vec![0x4000_0005]);
    assert!(errors("SMIS S0, {1, 1}")[0].contains("1:10:"));
    assert_eq!(errors("SMIS S0, {}").len(), 1);
    assert_eq!(errors("SMIS S0, {9}").len(), 1);
    assert_eq!(errors("SMIS S0, 0x20000").len(), 1);
}

#[test]
fn t_mask_emits_three_chunks() {
    assert_eq!(words("SMIT T3, {(2,0), (3,1)}"), vec![0x5018_0005, 0x5019_0000, 0x501a_0000]);
    assert_eq!(words("SMIT T3, 5"), words("SMIT T3, {(2,0), (3,1)}"));
    // last pair of the surface-7 edge list
    let w = words("SMIT T0, {(4,6)}");
    assert_eq!(w, vec![0x5000_8000, 0x5001_0000, 0x5002_0000]);
    // bits past the edge list name no pair
    assert_eq!(errors("SMIT T0, 0x10000"), vec!["1:10: imm (65536) too large, min=0, max=65535".to_string()]);
    assert_eq!(errors("SMIT T0, 0x10001").len(), 1);
    assert!(errors("SMIT T0, 0")[0].contains("empty t-mask"));
}

#[test]
fn t_mask_validation() {
    let reuse = errors("SMIT T0, {(2,0), (0,3)}");
    assert_eq!(reuse.len(), 1);
    assert!(reuse[0].contains("qubit '0' is used in more than one target-control pair"), "{}", reuse[0]);
    assert!(errors("SMIT T0, {(0,1)}")[0].contains("(0,1) is an invalid target-control pair"));
    assert_eq!(errors("SMIT T0, {(2,0), (2,0)}").len(), 1);
    // raw immediates are checked the same way: bits 0 and 1 share qubit 0
    assert!(errors("SMIT T0, 3")[0].contains("more than one target-control pair"));
}

#[test]
fn quantum_bundles() {
    assert_eq!(words("BS 2 H S1 | CZ T3"), vec![0x8103_001a]);
    // no BS prefix means separator 1; later words carry 0
    assert_eq!(words("X S0 | Y S1 | Z S2"), vec![0x8180_0809, 0x8284_0000]);
    assert_eq!(words("C,X90 S3"), vec![0x8346_0001]);
    assert_eq!(words("BS 0 QNOP"), vec![0x8000_0000]);
}

#[test]
fn quantum_errors() {
    assert!(errors("C,CZ T1")[0].contains("conditional"));
    assert!(errors("CZ S0")[0].starts_with("1:1:"));
    assert_eq!(errors("BS 8 H S0").len(), 1);
    assert_eq!(errors("H nothing").len(), 1);
}

#[test]
fn range_errors_carry_positions() {
    assert_eq!(errors("ADD R32, R1, R1"), vec!["1:5: R register nr (32) too high, max=31".to_string()]);
    assert_eq!(
        errors("LDI R1, 600000"),
        vec!["1:9: imm (600000) too large, min=-524287, max=524287".to_string()]
    );
    assert_eq!(errors("LDUI R1, -1").len(), 1);
    assert_eq!(errors("QWAIT 0x100000").len(), 1);
}

#[test]
fn errors_accumulate_per_line() {
    let errs = errors("FOO R1\nNOP\nLDI R40, 1\nADD R1, R2\n");
    assert_eq!(errs.len(), 3);
    assert!(errs[0].starts_with("1:1:"));
    assert!(errs[1].starts_with("3:5:"));
    assert!(errs[2].starts_with("4:11:"), "{}", errs[2]);
}
