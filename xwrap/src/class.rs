//! Classes of the foreign side: native-backed ones from `foreign_class!`
//! and ones created at run time with `xclass(name, bases, dict)`.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use log::debug;
use petgraph::{graph::NodeIndex, visit::Dfs, Graph};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::{
    exception::{CallResult, ForeignError},
    namegen::new_unique_name,
    native::NativeCell,
    value::Value,
};

pub(crate) type ClassGraphIdx = u32;
pub(crate) type ClassIdx = NodeIndex<ClassGraphIdx>;
/// Edge goes from class to its base, weight is position of base in `bases`
type ClassGraph = Graph<SmolStr, usize, petgraph::Directed, ClassGraphIdx>;

/// How instance refers to its native value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// instance owns its native value
    Value,
    /// native value is owned elsewhere, changes are visible in both places
    Reference,
}

pub struct Class {
    name: SmolStr,
    module: SmolStr,
    idx: ClassIdx,
    bases: Vec<Rc<Class>>,
    /// method resolution order without class itself
    ancestors: Vec<Rc<Class>>,
    dict: Vec<(SmolStr, Value)>,
    native_type: Option<SmolStr>,
    doc: Option<String>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn bases(&self) -> &[Rc<Class>] {
        &self.bases
    }

    /// Rust type of native value, own or inherited
    pub fn native_type(&self) -> Option<&str> {
        self.native_type.as_deref()
    }

    /// Names of classes in method resolution order, starting from this one
    pub fn mro_names(&self) -> Vec<SmolStr> {
        std::iter::once(self.name.clone())
            .chain(self.ancestors.iter().map(|x| x.name.clone()))
            .collect()
    }

    pub(crate) fn own_attr(&self, name: &str) -> Option<Value> {
        self.dict
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Attribute of class or first ancestor that has it
    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        self.own_attr(name)
            .or_else(|| self.ancestors.iter().find_map(|x| x.own_attr(name)))
    }

    pub(crate) fn is_subclass_of(&self, other: &Class) -> bool {
        self.idx == other.idx || self.ancestors.iter().any(|x| x.idx == other.idx)
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.qualified_name())
            .field("native_type", &self.native_type)
            .field("mro", &self.mro_names())
            .finish()
    }
}

/// Instance of foreign class, boundary wrapper if class is native-backed
pub struct Instance {
    class: Rc<Class>,
    native: RefCell<Option<NativeCell>>,
    holder: Cell<Holder>,
}

impl Instance {
    pub(crate) fn new(class: Rc<Class>) -> Rc<Instance> {
        Rc::new(Instance {
            class,
            native: RefCell::new(None),
            holder: Cell::new(Holder::Value),
        })
    }

    pub(crate) fn with_native(class: Rc<Class>, cell: NativeCell, holder: Holder) -> Rc<Instance> {
        Rc::new(Instance {
            class,
            native: RefCell::new(Some(cell)),
            holder: Cell::new(holder),
        })
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn native(&self) -> Option<NativeCell> {
        self.native.borrow().clone()
    }

    pub fn holder(&self) -> Holder {
        self.holder.get()
    }

    pub(crate) fn set_native(&self, cell: NativeCell) {
        *self.native.borrow_mut() = Some(cell);
        self.holder.set(Holder::Value);
    }
}

/// Class to create, bases are already checked
pub(crate) struct ClassDef {
    pub(crate) name: SmolStr,
    pub(crate) module: SmolStr,
    pub(crate) bases: Vec<Rc<Class>>,
    pub(crate) dict: Vec<(SmolStr, Value)>,
    pub(crate) native_type: Option<SmolStr>,
    pub(crate) doc: Option<String>,
}

/// All classes of runtime, with inheritance graph
#[derive(Default)]
pub(crate) struct ClassRegistry {
    graph: ClassGraph,
    classes: Vec<Rc<Class>>,
    keys: FxHashSet<SmolStr>,
}

impl ClassRegistry {
    pub(crate) fn len(&self) -> usize {
        self.classes.len()
    }

    pub(crate) fn add(&mut self, def: ClassDef) -> CallResult<Rc<Class>> {
        let native_type = layout_of_bases(&def)?;
        let key = new_unique_name(&self.keys, &format!("{}.{}", def.module, def.name));
        let idx = self.graph.add_node(key.clone());
        debug_assert_eq!(idx.index(), self.classes.len());
        for (pos, base) in def.bases.iter().enumerate() {
            self.graph.add_edge(idx, base.idx, pos);
        }
        let ancestors = self.mro(idx);
        debug!(
            "ClassRegistry::add: {} ({}), mro {:?}, native {:?}",
            def.name,
            key,
            ancestors.iter().map(|x| x.name()).collect::<Vec<_>>(),
            native_type
        );
        let class = Rc::new(Class {
            name: def.name,
            module: def.module,
            idx,
            bases: def.bases,
            ancestors,
            dict: def.dict,
            native_type,
            doc: def.doc,
        });
        self.keys.insert(key);
        self.classes.push(class.clone());
        Ok(class)
    }

    /// Depth-first, left-to-right, without duplicates
    fn mro(&self, idx: ClassIdx) -> Vec<Rc<Class>> {
        let mut ret = Vec::new();
        let mut dfs = Dfs::new(&self.graph, idx);
        while let Some(node) = dfs.next(&self.graph) {
            if node != idx {
                ret.push(self.classes[node.index()].clone());
            }
        }
        ret
    }
}

fn layout_of_bases(def: &ClassDef) -> CallResult<Option<SmolStr>> {
    let mut layouts: SmallVec<[&str; 2]> = def
        .bases
        .iter()
        .filter_map(|x| x.native_type())
        .collect();
    if let Some(own) = def.native_type.as_deref() {
        layouts.push(own);
    }
    layouts.sort_unstable();
    layouts.dedup();
    match layouts.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(SmolStr::from(*one))),
        _ => Err(ForeignError::type_error(format!(
            "multiple bases have instance lay-out conflict ({}) in class {}",
            layouts.join(", "),
            def.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExceptionKind;

    fn def(name: &str, bases: &[&Rc<Class>], native_type: Option<&str>) -> ClassDef {
        ClassDef {
            name: name.into(),
            module: "test".into(),
            bases: bases.iter().map(|x| Rc::clone(x)).collect(),
            dict: vec![(SmolStr::from("tag"), Value::str(name))],
            native_type: native_type.map(SmolStr::from),
            doc: None,
        }
    }

    #[test]
    fn test_mro_depth_first_left_to_right() {
        let mut reg = ClassRegistry::default();
        let a = reg.add(def("A", &[], None)).unwrap();
        let b = reg.add(def("B", &[&a], None)).unwrap();
        let c = reg.add(def("C", &[&a], None)).unwrap();
        let d = reg.add(def("D", &[&b, &c], None)).unwrap();
        assert_eq!(
            vec![
                SmolStr::from("D"),
                SmolStr::from("B"),
                SmolStr::from("A"),
                SmolStr::from("C")
            ],
            d.mro_names()
        );
        assert!(d.is_subclass_of(&a));
        assert!(!a.is_subclass_of(&d));
        assert!(d.lookup("tag").unwrap().equals(&Value::str("D")));
        assert!(b.lookup("tag").unwrap().equals(&Value::str("B")));
        assert_eq!(4, reg.len());
    }

    #[test]
    fn test_native_layout_inherited() {
        let mut reg = ClassRegistry::default();
        let xinst = reg.add(def("xinst", &[], Some("Complicated"))).unwrap();
        let simple = reg.add(def("Simple", &[], Some("Simple"))).unwrap();
        let c = reg.add(def("C", &[&xinst], None)).unwrap();
        assert_eq!(Some("Complicated"), c.native_type());
        let err = reg.add(def("Bad", &[&xinst, &simple], None)).err().unwrap();
        assert_eq!(ExceptionKind::TypeError, err.kind);
        assert!(err.message.starts_with("multiple bases have instance lay-out conflict"));
        // same name twice is fine
        let c2 = reg.add(def("C", &[&c], None)).unwrap();
        assert_eq!("test.C", c2.qualified_name());
        assert_eq!(Some("Complicated"), c2.native_type());
    }

    #[test]
    fn test_instance_native() {
        let mut reg = ClassRegistry::default();
        let noddy = reg.add(def("Noddy", &[], Some("i32"))).unwrap();
        let inst = Instance::new(noddy.clone());
        assert!(inst.native().is_none());
        inst.set_native(NativeCell::new("i32", 42_i32));
        assert_eq!(42, *inst.native().unwrap().borrow::<i32>().unwrap());
        let alias = Instance::with_native(noddy, inst.native().unwrap(), Holder::Reference);
        assert_eq!(Holder::Reference, alias.holder());
        *alias.native().unwrap().borrow_mut::<i32>().unwrap() = 1;
        assert_eq!(1, *inst.native().unwrap().borrow::<i32>().unwrap());
    }
}
