use std::thread::{Scope, ScopedJoinHandle};

pub fn spawn<F, T>(name: &str, f: F) -> std::io::Result<std::thread::JoinHandle<T>>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(f)
}

/// Named thread bound to `scope`; joined when the scope ends.
pub fn spawn_scoped<'scope, 'env, F, T>(
    scope: &'scope Scope<'scope, 'env>,
    name: &str,
    f: F,
) -> std::io::Result<ScopedJoinHandle<'scope, T>>
where
    F: FnOnce() -> T,
    F: Send + 'scope,
    T: Send + 'scope,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn_scoped(scope, f)
}

#[cfg(test)]
mod tests {
    use crate::utils::thread::{spawn, spawn_scoped};

    #[test]
    pub fn named_thread_test() {
        let handle = spawn("FF-Test", || {
            std::thread::current().name().map(|name| name.to_string())
        })
        .unwrap();
        assert_eq!(handle.join().unwrap(), Some("FF-Test".to_string()));

        let name = std::thread::scope(|s| {
            spawn_scoped(s, "FF-Scoped", || {
                std::thread::current().name().map(|name| name.to_string())
            })
            .unwrap()
            .join()
            .unwrap()
        });
        assert_eq!(name, Some("FF-Scoped".to_string()));
    }
}
