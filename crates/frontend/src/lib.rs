pub mod shared;
pub mod system;

pub use shared::state::context::{provide_form_session, use_form_session, FormSessionProvider};
pub use shared::state::session::FormSession;
pub use system::handle::FichaHandle;

use wasm_bindgen::prelude::wasm_bindgen;

#[wasm_bindgen(start)]
pub fn start() {
    // initializes logging using the `log` crate
    _ = console_log::init_with_level(log::Level::Debug);
    console_error_panic_hook::set_once();
}
