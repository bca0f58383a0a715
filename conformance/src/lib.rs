//! Native fixtures and `m1`/`m2` modules used by conformance scripts.

mod m1;
mod m2;

use log::debug;
use xwrap::{Bindings, BuildError, Runtime};

pub const NODDY_VALUE: i32 = 42;
pub const SIMPLE_CONTENT: &str = "hello, world";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simple {
    s: String,
}

impl Simple {
    pub fn new(s: &str) -> Simple {
        Simple { s: s.to_string() }
    }
    pub fn content(&self) -> &str {
        &self.s
    }
    pub fn set_content(&mut self, s: &str) {
        self.s.clear();
        self.s.push_str(s);
    }
}

/// Native part of `xinst` and classes derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complicated {
    s: String,
    n: i32,
}

impl Complicated {
    pub fn new(s: &Simple) -> Complicated {
        Complicated::with_n(s, 0)
    }
    pub fn with_n(s: &Simple, n: i32) -> Complicated {
        Complicated {
            s: s.content().to_string(),
            n,
        }
    }
    pub fn get_n(&self) -> i32 {
        self.n
    }
    pub fn content(&self) -> &str {
        &self.s
    }
}

/// Runtime with `m1` and `m2` modules
pub fn runtime() -> Result<Runtime, BuildError> {
    let bindings = Bindings::new()
        .bind_type::<Simple>("Simple")
        .bind_type::<Complicated>("Complicated");
    let bindings = m1::bind(bindings);
    let bindings = m2::bind(bindings);
    let rt = bindings.build()?;
    debug!("conformance runtime: {:?}", rt);
    Ok(rt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures() {
        let mut s = Simple::new(SIMPLE_CONTENT);
        assert_eq!(12, s.content().len());
        let c = Complicated::new(&s);
        assert_eq!(0, c.get_n());
        assert_eq!(SIMPLE_CONTENT, c.content());
        s.set_content("x");
        assert_eq!(99, Complicated::with_n(&s, 99).get_n());
        assert_eq!("x", Complicated::with_n(&s, 99).content());
    }
}
