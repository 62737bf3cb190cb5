//! `show` directive - Toggle `display: none`, through transitions when present.
//!
//! The first evaluation applies immediately. Later changes go through
//! [`toggle_with_transitions`], which defers showing by a frame and waits for
//! leave transitions (and those of transitioning descendants) before hiding.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{Directive, DirectiveContext};
use crate::engine::{remove_style, set_style};
use crate::error::Result;
use crate::pipeline::{mutate_dom, set_timeout};
use crate::transition::toggle_with_transitions;
use crate::types::{is_truthy, NodeIndex, Value};

/// `x-show="expr"` (`.immediate` also shows without waiting for transitions).
pub fn show_directive(node: NodeIndex, directive: &Directive, cx: &DirectiveContext) -> Result<()> {
    let getter = cx.evaluate_later(&directive.expression);
    let immediate = directive.has_modifier("immediate");

    let show: Rc<dyn Fn()> = Rc::new(move || {
        mutate_dom(|| {
            remove_style(node, "display");
        });
    });
    let hide: Rc<dyn Fn()> = Rc::new(move || {
        mutate_dom(|| {
            set_style(node, "display", "none");
        });
    });

    let first_time = Cell::new(true);
    let old_value: RefCell<Option<Value>> = RefCell::new(None);

    cx.effect(move || {
        let value = getter(None);
        if !first_time.get() && old_value.borrow().as_ref() == Some(&value) {
            return;
        }
        let visible = is_truthy(&value);

        if immediate {
            if visible {
                let show = show.clone();
                set_timeout(move || show(), 0);
            } else {
                hide();
            }
        }

        if first_time.replace(false) {
            if visible { show() } else { hide() }
        } else {
            let show = show.clone();
            let hide = hide.clone();
            toggle_with_transitions(node, visible, Box::new(move || show()), Box::new(move || hide()));
        }
        *old_value.borrow_mut() = Some(value);
    });
    Ok(())
}
