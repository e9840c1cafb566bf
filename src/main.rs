fn main() {
    seqdrive::cli::run();
}
