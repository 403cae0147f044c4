fn main() {
    // PDFium is dynamically linked and resolved at runtime from:
    // 1. The current directory
    // 2. vendor/pdfium/lib/
    // 3. System library paths
    println!("cargo:rerun-if-changed=build.rs");
}
