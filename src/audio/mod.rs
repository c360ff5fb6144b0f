//! # Audio Container Encoding
//!
//! Turns the raw mu-law sample buffer accumulated by a session into a
//! standard RIFF/WAVE container on session end.
//!
//! ## Audio Format:
//! - **Encoding**: PCMU (mu-law companded), format code 7
//! - **Sample Rate**: 8kHz
//! - **Bit Depth**: 8-bit
//! - **Channels**: 1 or 2, per the negotiated channel set

pub mod wav; // RIFF/WAVE container encoder and header parser
