use rustc_hash::FxHashSet;
use smol_str::SmolStr;

/// `templ`, or `templ` with numeric suffix if `templ` is already taken
pub(crate) fn new_unique_name(names: &FxHashSet<SmolStr>, templ: &str) -> SmolStr {
    if !names.contains(templ) {
        return templ.into();
    }
    let mut idx = 0_u64;
    loop {
        let new_name: SmolStr = format!("{}{}", templ, idx).into();
        if !names.contains(&new_name) {
            return new_name;
        }
        idx += 1;
    }
}
