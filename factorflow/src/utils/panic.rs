use std::any::Any;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic occurred".to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::panic::panic_message;

    #[test]
    pub fn panic_message_test() {
        let e = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(e.as_ref()), "boom");

        let e = std::panic::catch_unwind(|| panic!("value {}", 3)).unwrap_err();
        assert_eq!(panic_message(e.as_ref()), "value 3");

        let e = std::panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(e.as_ref()), "panic occurred");
    }
}
