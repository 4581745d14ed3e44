fn main() {
    slint_build::compile("ui/app.slint").expect("failed to compile app.slint");
    println!("cargo:rerun-if-changed=ui/app.slint");
}
