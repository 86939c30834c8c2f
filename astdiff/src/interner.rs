//! Type label interning.
//!
//! Each tree owns an [`Interner`]; labels are compared across trees through a
//! [`LabelBridge`], which translates one tree's symbols into the other's.

use rapidhash::RapidHashMap as HashMap;

/// A lightweight handle to an interned type label.
///
/// Symbols are only meaningful for the interner that produced them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol(u32);

/// Deduplicates label strings into [`Symbol`]s.
#[derive(Debug, Clone, Default)]
pub struct Interner {
    map: HashMap<String, Symbol>,
    strings: Vec<String>,
}

impl Interner {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a label, returning the existing symbol if it was seen before.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            return sym;
        }

        let sym = Symbol(self.strings.len() as u32);
        self.strings.push(s.to_owned());
        self.map.insert(s.to_owned(), sym);
        sym
    }

    /// Look up a label without interning it.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    /// Resolve a symbol back to its label.
    ///
    /// # Panics
    /// Panics if the symbol was not created by this interner.
    #[inline]
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }

    fn labels(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }
}

/// Translation table from the symbols of interner A to those of interner B.
#[derive(Debug, Clone)]
pub struct LabelBridge {
    a_to_b: Vec<Option<Symbol>>,
}

impl LabelBridge {
    /// Build the table. Labels of A that never occur in B translate to `None`.
    pub fn new(a: &Interner, b: &Interner) -> Self {
        let a_to_b = a.labels().map(|label| b.get(label)).collect();
        Self { a_to_b }
    }

    /// The B-side symbol for an A-side symbol, if B knows that label.
    #[inline]
    pub fn to_b(&self, sym_a: Symbol) -> Option<Symbol> {
        self.a_to_b.get(sym_a.0 as usize).copied().flatten()
    }

    /// Whether an A-side symbol and a B-side symbol name the same label.
    #[inline]
    pub fn same(&self, sym_a: Symbol, sym_b: Symbol) -> bool {
        self.to_b(sym_a) == Some(sym_b)
    }
}
