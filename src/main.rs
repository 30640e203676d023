fn main() -> std::process::ExitCode {
    skinweave_lib::run()
}
