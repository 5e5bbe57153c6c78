// Shell state shared between the frame loop, the input thread and script
// bindings.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use luma_runtime::mlua;
use luma_runtime::{bindings, BindingProvider, Host};
use parking_lot::Mutex;

/// What the headless "window" looks like right now.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowState {
    pub width: u32,
    pub height: u32,
    pub cursor: (f64, f64),
}

/// The host side of the runtime: quit flag plus window state.
pub struct Shell {
    quit: AtomicBool,
    window: Mutex<WindowState>,
    started: Instant,
}

impl Shell {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            quit: AtomicBool::new(false),
            window: Mutex::new(WindowState { width, height, cursor: (0.0, 0.0) }),
            started: Instant::now(),
        })
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn window(&self) -> WindowState {
        *self.window.lock()
    }

    pub fn resize(&self, width: u32, height: u32) {
        let mut window = self.window.lock();
        window.width = width;
        window.height = height;
    }

    pub fn move_cursor(&self, x: f64, y: f64) {
        self.window.lock().cursor = (x, y);
    }

    /// Capabilities for the `app` native module.
    pub fn app_capabilities(self: &Arc<Self>) -> Arc<dyn BindingProvider> {
        let shell = Arc::clone(self);
        bindings("app", move |lua, env| {
            let s = shell.clone();
            env.set(
                "getWindowSize",
                lua.create_function(move |_, ()| {
                    let w = s.window();
                    Ok((w.width, w.height))
                })?,
            )?;

            let s = shell.clone();
            env.set(
                "getAspectRatio",
                lua.create_function(move |_, ()| {
                    let w = s.window();
                    Ok(if w.height == 0 { 0.0 } else { w.width as f64 / w.height as f64 })
                })?,
            )?;

            let s = shell.clone();
            env.set(
                "getElapsedSeconds",
                lua.create_function(move |_, ()| Ok(s.started.elapsed().as_secs_f64()))?,
            )?;
            Ok::<(), mlua::Error>(())
        })
    }
}

impl Host for Shell {
    fn request_quit(&self) {
        if !self.quit.swap(true, Ordering::SeqCst) {
            log::info!("quit requested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use luma_runtime::mlua::Lua;

    #[test]
    fn test_capabilities_follow_resize() {
        let shell = Shell::new(800, 400);
        let lua = Lua::new();
        let env = lua.create_table().unwrap();
        shell.app_capabilities().install(&lua, &env).unwrap();

        let ratio: f64 = lua
            .load("return getAspectRatio()")
            .set_environment(env.clone())
            .eval()
            .unwrap();
        assert_eq!(ratio, 2.0);

        shell.resize(300, 300);
        let (w, h): (u32, u32) = lua
            .load("return getWindowSize()")
            .set_environment(env)
            .eval()
            .unwrap();
        assert_eq!((w, h), (300, 300));
    }

    #[test]
    fn test_quit_is_sticky() {
        let shell = Shell::new(1, 1);
        assert!(!shell.quit_requested());
        shell.request_quit();
        shell.request_quit();
        assert!(shell.quit_requested());
    }
}
