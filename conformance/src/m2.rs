use xwrap::{Bindings, ExceptionKind, ForeignError, NativeReturn};

use crate::{Complicated, Simple};

pub(crate) fn bind(bindings: Bindings) -> Bindings {
    bindings
        .declare("m2.rs.in", include_str!("m2.rs.in"))
        .bind_fn("wrap_int", |frame| {
            let x: i32 = frame.value(0)?;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("wrap_int_ref", |frame| frame.alias(0))
        .bind_fn("wrap_int_const_ref", |frame| frame.alias(0))
        .bind_fn("wrap_simple", |frame| {
            let x: Simple = frame.value(0)?;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("wrap_simple_ref", |frame| frame.alias(0))
        .bind_fn("wrap_simple_const_ref", |frame| frame.alias(0))
        .bind_fn("Complicated::new", |frame| {
            let s = frame.borrow::<Simple>(0)?;
            let c = Complicated::new(&s);
            Ok(NativeReturn::value(c))
        })
        .bind_fn("Complicated::with_n", |frame| {
            let n: i32 = frame.value(1)?;
            let s = frame.borrow::<Simple>(0)?;
            let c = Complicated::with_n(&s, n);
            Ok(NativeReturn::value(c))
        })
        .bind_fn("Complicated::get_n", |frame| {
            let n = frame.borrow::<Complicated>(0)?.get_n();
            Ok(NativeReturn::value(n))
        })
        .bind_fn("call_get_n", |frame| {
            let n = frame.call_method(0, "get_n", &[])?.as_int()?;
            let n = i32::try_from(n).map_err(|_| {
                ForeignError::new(
                    ExceptionKind::OverflowError,
                    format!("get_n() returned {}, it does not fit into i32", n),
                )
            })?;
            Ok(NativeReturn::value(n))
        })
        .bind_fn("xclass", |frame| {
            let class = frame.runtime().create_class(
                &frame.object(0)?,
                &frame.object(1)?,
                &frame.object(2)?,
            )?;
            Ok(NativeReturn::Object(class))
        })
}
