pub mod assembler;
pub mod banked_memory;
pub mod bjt_engine;
pub mod cpu;
pub mod device;
pub mod disasm;
pub mod error;
pub mod framebuffer;
pub mod isa;
pub mod outcome;
pub mod source;
pub mod tokenizer;
