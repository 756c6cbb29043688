#![allow(dead_code)]

use qisa_as::{Error, Program, Session, SessionConfig};

pub const SURFACE7: &str = include_str!("../../demos/surface7.topology");

pub fn session() -> Session {
    let mut s = Session::new(SessionConfig::default());
    s.load_topology(SURFACE7).unwrap();
    s
}

pub fn assemble(src: &str) -> Program {
    session().assemble(src).unwrap().clone()
}

pub fn words(src: &str) -> Vec<u32> {
    assemble(src).words
}

/// Diagnostics of a failed assembly, rendered one per entry.
pub fn errors(src: &str) -> Vec<String> {
    match session().assemble(src) {
        Err(Error::Assembly(diags)) => diags.iter().map(|e| e.to_string()).collect(),
        Err(other) => panic!("expected diagnostics, got {other}"),
        Ok(p) => panic!("expected diagnostics, assembled {} words", p.len()),
    }
}

pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}
