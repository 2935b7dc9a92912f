//! Disassembly listings of generated code, used for trace logging.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};

/// One line per decoded instruction: address, raw bytes, NASM text.
pub fn listing(code: &[u8], ip: u64) -> Vec<String> {
    let mut decoder = Decoder::with_ip(64, code, ip, DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    formatter.options_mut().set_first_operand_char_index(8);

    let mut instruction = Instruction::default();
    let mut text = String::new();
    let mut lines = Vec::new();

    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        text.clear();
        formatter.format(&instruction, &mut text);

        let start = (instruction.ip() - ip) as usize;
        let raw: String = code[start..start + instruction.len()]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        lines.push(format!("{:016X} {:<20} {}", instruction.ip(), raw, text));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_fence_and_ret() {
        let lines = listing(&[0x0F, 0xAE, 0xF0, 0xC3], 0x1000);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("mfence"));
        assert!(lines[0].starts_with("0000000000001000 0FAEF0"));
        assert!(lines[1].contains("ret"));
    }
}
