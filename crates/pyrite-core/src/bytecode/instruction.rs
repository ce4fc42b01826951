//! Bytecode Instruction Representation
//!
//! Expands a raw instruction byte stream into a flat, fixed-width
//! instruction sequence. Every instruction occupies exactly two bytes
//! (opcode + operand), including opcodes that ignore their operand, so
//! jump targets are plain indices into the decoded sequence.

/// One decoded instruction: raw opcode byte plus operand byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub arg: u8,
}

/// Decode a 2-byte-aligned instruction stream.
///
/// Pure and idempotent: produces exactly `code.len() / 2` entries, with
/// entry `i` taken verbatim from bytes `[2i, 2i + 1]`. Opcode validity is
/// checked at execution time, not here.
pub fn decode(code: &[u8]) -> Vec<Instruction> {
    code.chunks_exact(2)
        .map(|unit| Instruction {
            opcode: unit[0],
            arg: unit[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_produces_one_entry_per_unit() {
        let code = [100u8, 0, 100, 1, 23, 0, 83, 0];
        let decoded = decode(&code);
        assert_eq!(decoded.len(), 4);
        for (i, ins) in decoded.iter().enumerate() {
            assert_eq!(ins.opcode, code[2 * i]);
            assert_eq!(ins.arg, code[2 * i + 1]);
        }
    }

    #[test]
    fn decode_empty_stream() {
        assert!(decode(&[]).is_empty());
    }

    #[test]
    fn decode_keeps_operand_of_argless_opcodes() {
        // PopTop takes no operand but its operand byte is still present.
        let decoded = decode(&[1u8, 7]);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].arg, 7);
    }
}
