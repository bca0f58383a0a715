use xwrap::{Bindings, ExceptionKind, ForeignError, NativeReturn};

use crate::{Simple, NODDY_VALUE, SIMPLE_CONTENT};

pub(crate) fn bind(bindings: Bindings) -> Bindings {
    bindings
        .declare("m1.rs.in", include_str!("m1.rs.in"))
        .bind_fn("Simple::new", |frame| {
            let s = frame.borrow::<String>(0)?;
            Ok(NativeReturn::value(Simple::new(&s)))
        })
        .bind_fn("Simple::content", |frame| {
            let this = frame.borrow::<Simple>(0)?;
            Ok(NativeReturn::value(this.content().to_string()))
        })
        .bind_fn("Simple::set_content", |frame| {
            let s = frame.borrow::<String>(1)?.clone();
            frame.borrow_mut::<Simple>(0)?.set_content(&s);
            Ok(NativeReturn::Unit)
        })
        .bind_fn("new_noddy", |_| Ok(NativeReturn::value(NODDY_VALUE)))
        .bind_fn("new_simple", |_| {
            Ok(NativeReturn::value(Simple::new(SIMPLE_CONTENT)))
        })
        .bind_fn("unwrap_int", |frame| {
            let x: i32 = frame.value(0)?;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("unwrap_int_ref", |frame| {
            let x = *frame.borrow_mut::<i32>(0)?;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("unwrap_int_const_ref", |frame| {
            let x = *frame.borrow::<i32>(0)?;
            Ok(NativeReturn::value(x))
        })
        .bind_fn("unwrap_simple", |frame| {
            let x: Simple = frame.value(0)?;
            Ok(NativeReturn::value(x.content().to_string()))
        })
        .bind_fn("unwrap_simple_ref", |frame| {
            let content = frame.borrow_mut::<Simple>(0)?.content().to_string();
            Ok(NativeReturn::value(content))
        })
        .bind_fn("unwrap_simple_const_ref", |frame| {
            let content = frame.borrow::<Simple>(0)?.content().to_string();
            Ok(NativeReturn::value(content))
        })
        .bind_fn("f", |frame| {
            let len = frame.borrow::<Simple>(0)?.content().len();
            let len = i32::try_from(len).map_err(|_| {
                ForeignError::new(
                    ExceptionKind::OverflowError,
                    format!("content length {} does not fit into i32", len),
                )
            })?;
            Ok(NativeReturn::value(len))
        })
        .bind_fn("g", |frame| {
            let copy = frame.borrow::<Simple>(0)?.clone();
            Ok(NativeReturn::value(copy))
        })
}
