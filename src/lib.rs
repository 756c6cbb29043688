pub mod decoder;
pub mod disasm;
pub mod encoder;
pub mod error;
pub mod instructions;
pub mod opcodes;
pub mod parser;
pub mod qmap;
pub mod session;
pub mod symbols;
pub mod topology;

pub mod isa {
    pub mod cond;
    pub mod layout;
    pub mod registers;
}

pub use decoder::{Decoded, Decoder, QisaDecoder};
pub use disasm::{Listing, ListingFormat};
pub use encoder::{Assembler, Program};
pub use error::{AsmError, Diagnostics, DisasmError, Error, Span};
pub use opcodes::OpcodeRegistry;
pub use session::{Options, Session, SessionConfig};
pub use topology::{TcPair, Topology};
