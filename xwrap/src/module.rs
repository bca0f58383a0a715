use std::cell::RefCell;

use smol_str::SmolStr;

use crate::value::Value;

/// Namespace created from `foreign_module!` (or by a foreign script)
pub struct Module {
    name: SmolStr,
    doc: Option<String>,
    attrs: RefCell<Vec<(SmolStr, Value)>>,
}

impl Module {
    pub(crate) fn new(name: SmolStr, doc: Option<String>) -> Module {
        Module {
            name,
            doc,
            attrs: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs
            .borrow()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    pub(crate) fn set(&self, name: SmolStr, value: Value) {
        let mut attrs = self.attrs.borrow_mut();
        match attrs.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => attrs.push((name, value)),
        }
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.attrs.borrow().iter().any(|(k, _)| k == name)
    }

    /// Names exported by `from module import *`, in declaration order
    pub fn public_names(&self) -> Vec<SmolStr> {
        self.attrs
            .borrow()
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_attrs() {
        let m = Module::new("m1".into(), None);
        m.set("b".into(), Value::Int(1));
        m.set("_hidden".into(), Value::None);
        m.set("a".into(), Value::Int(2));
        m.set("b".into(), Value::Int(3));
        assert_eq!(vec![SmolStr::from("b"), SmolStr::from("a")], m.public_names());
        assert!(m.get("b").unwrap().equals(&Value::Int(3)));
        assert!(m.contains("_hidden"));
        assert!(m.get("c").is_none());
    }
}
