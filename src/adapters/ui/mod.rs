pub mod banner;
pub mod tui;

/// Prints the banner and installs the prompt theme. Call once, after tracing is set up.
pub fn init_ui() {
    banner::print_welcome();
    tui::apply_theme();
}
