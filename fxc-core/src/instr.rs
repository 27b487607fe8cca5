//! SPIR-V instruction records and word-level encoding.
use spirv::Op;
use std::fmt;

use crate::{
    error::{anyhow, Result},
    location::Location,
    ty::Id,
};

/// A single owned SPIR-V instruction under construction. A `result_type` or
/// `result` of zero means the slot is absent; zero is never a valid id.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub op: Op,
    pub result_type: Id,
    pub result: Id,
    pub operands: Vec<u32>,
    pub location: Location,
}

impl Instruction {
    pub fn new(op: Op) -> Instruction {
        Instruction {
            op,
            result_type: 0,
            result: 0,
            operands: Vec::new(),
            location: Location::default(),
        }
    }

    pub fn with_type(mut self, result_type: Id) -> Self {
        self.result_type = result_type;
        self
    }
    pub fn with_result(mut self, result: Id) -> Self {
        self.result = result;
        self
    }
    pub fn at(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
    pub fn push(mut self, x: u32) -> Self {
        self.operands.push(x);
        self
    }
    pub fn push_list(mut self, x: &[u32]) -> Self {
        self.operands.extend_from_slice(x);
        self
    }
    /// Pack a string operand: four bytes per word, little-endian, with a nul
    /// terminator and zero padding up to the next word boundary.
    pub fn push_str(mut self, x: &str) -> Self {
        let bytes = x.as_bytes();
        let mut word = 0u32;
        let mut shift = 0u32;
        for byte in bytes {
            word |= (*byte as u32) << shift;
            shift += 8;
            if shift == 32 {
                self.operands.push(word);
                word = 0;
                shift = 0;
            }
        }
        // The terminating nul always fits: either the current word has a free
        // byte, or a fresh all-zero word is appended.
        self.operands.push(word);
        self
    }

    /// Number of words this instruction occupies, including the leading
    /// count/opcode word.
    pub fn word_count(&self) -> u32 {
        1 + (self.result_type != 0) as u32 + (self.result != 0) as u32 + self.operands.len() as u32
    }

    pub fn write_words(&self, out: &mut Vec<u32>) {
        out.push((self.word_count() << 16) | (self.op as u32));
        if self.result_type != 0 {
            out.push(self.result_type);
        }
        if self.result != 0 {
            out.push(self.result);
        }
        out.extend_from_slice(&self.operands);
    }
}
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {:?}", self.op, self.operands)
    }
}

/// A borrowed view of one instruction inside an emitted word stream.
#[derive(Clone, Copy, Debug)]
pub struct InstrRef<'a> {
    words: &'a [u32],
}
impl<'a> InstrRef<'a> {
    pub fn opcode(&self) -> u32 {
        self.words[0] & 0xFFFF
    }
    pub fn op(&self) -> Op {
        use num_traits::FromPrimitive;
        Op::from_u32(self.opcode()).unwrap_or(Op::Nop)
    }
    /// Word count as recorded in the leading word.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
    /// All words following the count/opcode word, result ids included.
    pub fn operands(&self) -> &'a [u32] {
        &self.words[1..]
    }
    /// Read a packed string starting at operand index `idx`.
    pub fn read_str(&self, idx: usize) -> Result<String> {
        let mut out = Vec::new();
        for word in &self.operands()[idx..] {
            for byte in word.to_le_bytes().iter() {
                if *byte == 0 {
                    return String::from_utf8(out).map_err(|_| anyhow!("string is not utf-8"));
                }
                out.push(*byte);
            }
        }
        Err(anyhow!("string is not nul-terminated"))
    }
}

/// An emitted SPIR-V program binary.
#[derive(Debug, Default, Clone)]
pub struct SpirvBinary(Vec<u32>);
impl From<Vec<u32>> for SpirvBinary {
    fn from(x: Vec<u32>) -> Self {
        SpirvBinary(x)
    }
}
impl SpirvBinary {
    pub fn words(&self) -> &[u32] {
        &self.0
    }
    pub fn into_words(self) -> Vec<u32> {
        self.0
    }
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
            .iter()
            .flat_map(|x| x.to_le_bytes().to_vec())
            .collect()
    }
    /// Iterate the instructions following the five header words.
    pub fn instrs(&self) -> Instrs {
        const HEADER_LEN: usize = 5;
        Instrs::new(&self.words()[HEADER_LEN.min(self.0.len())..])
    }
}

/// Iterator over the instructions of a SPIR-V word stream, header excluded.
pub struct Instrs<'a> {
    inner: &'a [u32],
}
impl<'a> Instrs<'a> {
    pub fn new(words: &'a [u32]) -> Instrs<'a> {
        Instrs { inner: words }
    }
}
impl<'a> Iterator for Instrs<'a> {
    type Item = Result<InstrRef<'a>>;
    fn next(&mut self) -> Option<Self::Item> {
        let head = *self.inner.first()?;
        let len = (head >> 16) as usize;
        if len == 0 {
            self.inner = &[];
            return Some(Err(anyhow!("instruction length is zero")));
        }
        if len > self.inner.len() {
            self.inner = &[];
            return Some(Err(anyhow!("instruction is truncated")));
        }
        let instr = InstrRef {
            words: &self.inner[..len],
        };
        self.inner = &self.inner[len..];
        Some(Ok(instr))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_word_count() {
        let instr = Instruction::new(Op::IAdd)
            .with_type(6)
            .with_result(7)
            .push(1)
            .push(2);
        assert_eq!(instr.word_count(), 5);
        let mut words = Vec::new();
        instr.write_words(&mut words);
        assert_eq!(words, vec![(5 << 16) | (Op::IAdd as u32), 6, 7, 1, 2]);
    }

    #[test]
    fn test_string_packing() {
        // "GLSL.std.450" is 12 bytes: 3 full words plus a nul-only word.
        let instr = Instruction::new(Op::ExtInstImport)
            .with_result(1)
            .push_str("GLSL.std.450");
        assert_eq!(instr.operands.len(), 4);
        assert_eq!(instr.operands[3], 0);
        // "abc" packs into a single word with a nul in the top byte.
        let instr = Instruction::new(Op::String).with_result(2).push_str("abc");
        assert_eq!(instr.operands, vec![0x0063_6261]);
    }

    #[test]
    fn test_roundtrip_through_reader() {
        let mut words = Vec::new();
        Instruction::new(Op::TypeInt)
            .with_result(6)
            .push(32)
            .push(1)
            .write_words(&mut words);
        Instruction::new(Op::Name)
            .push(6)
            .push_str("x")
            .write_words(&mut words);

        let mut instrs = Instrs::new(&words);
        let first = instrs.next().unwrap().unwrap();
        assert_eq!(first.op(), Op::TypeInt);
        assert_eq!(first.operands(), &[6, 32, 1]);
        let second = instrs.next().unwrap().unwrap();
        assert_eq!(second.op(), Op::Name);
        assert_eq!(second.read_str(1).unwrap(), "x");
        assert!(instrs.next().is_none());
    }
}
