use std::path::{Path, PathBuf};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::decoder::QisaDecoder;
use crate::disasm::{Listing, ListingFormat};
use crate::encoder::{Assembler, Program};
use crate::error::{DisasmError, Error};
use crate::isa::layout::Word;
use crate::opcodes::OpcodeRegistry;
use crate::topology::Topology;
use crate::{parser, qmap};

bitflags! {
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options: u32 {
const ALLOW_LABEL_REDEFINITION = 1 << 0; // later definition wins, with a warning
}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub options: Options,
    pub format: ListingFormat,
}

/// Result of the last successful action, which is what [`Session::save`] writes.
#[derive(Debug, Clone, Default)]
enum Output {
    #[default]
    None,
    Assembled(Program),
    Disassembled(Listing),
}

/// Opcode tables, topology and the output of the last assembly or
/// disassembly run.
#[derive(Debug, Clone, Default)]
pub struct Session {
    registry: OpcodeRegistry,
    topology: Option<Topology>,
    pub cfg: SessionConfig,
    output: Output,
}

impl Session {
    pub fn new(cfg: SessionConfig) -> Self {
        Self { cfg, ..Self::default() }
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn registry(&self) -> &OpcodeRegistry {
        &self.registry
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn set_topology(&mut self, topology: Topology) {
        self.topology = Some(topology);
    }

    pub fn load_topology(&mut self, text: &str) -> Result<(), Error> {
        let topology = Topology::parse(text)?;
        tracing::debug!(qubits = topology.qubit_count(), pairs = topology.pairs().len(), "loaded topology");
        self.topology = Some(topology);
        Ok(())
    }

    pub fn load_topology_file(&mut self, path: &Path) -> Result<(), Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.load_topology(&text)
    }

    pub fn load_qmap(&mut self, text: &str) -> Result<(), Error> {
        let tables = qmap::parse(text)?;
        self.registry.load_quantum_opcodes(&tables.none, &tables.st, &tables.tt)?;
        Ok(())
    }

    pub fn load_qmap_file(&mut self, path: &Path) -> Result<(), Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.load_qmap(&text)
    }

    /// Selects the listing layout by its numeric id (1 or 2).
    pub fn set_format_id(&mut self, id: u8) -> Result<(), Error> {
        self.cfg.format = ListingFormat::from_id(id).ok_or(Error::BadFormatId(id))?;
        Ok(())
    }

    /// Drops previous output. Opcode tables, topology and config are kept.
    pub fn reset(&mut self) {
        self.output = Output::None;
    }

    /// Assembles `source`. Every diagnostic is returned on failure.
    pub fn assemble(&mut self, source: &str) -> Result<&Program, Error> {
        self.reset();
        let topology = self.topology.as_ref().ok_or(Error::NoTopology)?;
        let mut asm = Assembler::new(&self.registry, topology, self.cfg.options);
        parser::assemble_source(&mut asm, source);
        let program = asm.finish()?;
        tracing::debug!(words = program.len(), labels = program.labels.len(), "assembled");
        self.output = Output::Assembled(program);
        self.program().ok_or(Error::NothingToSave)
    }

    pub fn assemble_file(&mut self, path: &Path) -> Result<&Program, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        self.assemble(&text)
    }

    /// Disassembles a native-endian word stream.
    ///
    /// Words that fail to decode are kept in the listing with a placeholder;
    /// inspect [`Listing::errors`]. Trailing bytes that do not form a word are
    /// reported there too, at the address past the last word.
    pub fn disassemble(&mut self, bytes: &[u8]) -> Result<&Listing, Error> {
        self.reset();
        if bytes.is_empty() {
            return Err(Error::EmptyInput);
        }
        let words: Vec<Word> = bytes
            .chunks_exact(4)
            .map(|c| Word::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let decoder = QisaDecoder::new(&self.registry, self.topology.as_ref());
        let mut listing = Listing::build(&decoder, &words);
        let trailing = bytes.len() % 4;
        if trailing != 0 {
            tracing::warn!(trailing, "input length is not a multiple of the word size");
            listing.set_tail_error(DisasmError::TrailingBytes { count: trailing });
        }
        self.output = Output::Disassembled(listing);
        self.listing().ok_or(Error::NothingToSave)
    }

    pub fn disassemble_file(&mut self, path: &Path) -> Result<&Listing, Error> {
        let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        self.disassemble(&bytes)
    }

    pub fn program(&self) -> Option<&Program> {
        match &self.output {
            Output::Assembled(p) => Some(p),
            _ => None,
        }
    }

    pub fn listing(&self) -> Option<&Listing> {
        match &self.output {
            Output::Disassembled(l) => Some(l),
            _ => None,
        }
    }

    /// Listing text in the configured format.
    pub fn disassembly_output(&self) -> Option<String> {
        self.listing().map(|l| l.render(self.cfg.format))
    }

    /// Writes the binary after assembly, or the listing after disassembly.
    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), Error> {
        let path = path.into();
        let data = match &self.output {
            Output::None => return Err(Error::NothingToSave),
            Output::Assembled(p) => p.to_bytes(),
            Output::Disassembled(l) => l.render(self.cfg.format).into_bytes(),
        };
        std::fs::write(&path, data).map_err(|e| Error::io(&path, e))?;
        tracing::debug!(path = %path.display(), "saved");
        Ok(())
    }
}
