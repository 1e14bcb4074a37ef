fn main() {
    vellum::cli::run();
}
