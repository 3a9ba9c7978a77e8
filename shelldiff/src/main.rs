//! Command-line entry point for `shelldiff`.

fn main() {
    shelldiff::entry::run();
}
