extern crate bindgen;

use std::env;
use std::path::PathBuf;

const KLU_LIBS: [&str; 7] = [
    "klu",
    "camd",
    "amd",
    "btf",
    "ccolamd",
    "colamd",
    "suitesparseconfig",
];

/// Include directories handed to clang, `SUITESPARSE_DIR` first when it is set.
fn include_dirs(root: Option<&str>) -> Vec<String> {
    let mut dirs = Vec::new();
    if let Some(root) = root {
        dirs.push(format!("{root}/include"));
        dirs.push(format!("{root}/include/suitesparse"));
    }
    dirs.push("/usr/include/suitesparse".to_string());
    dirs.push("/usr/local/include/suitesparse".to_string());
    dirs
}

#[cfg(all(target_os = "windows", target_env = "msvc"))]
fn link(root: Option<&str>) {
    let root = root.expect("SUITESPARSE_DIR is not set");
    println!("cargo:rustc-link-search={root}/lib");
    for lib in KLU_LIBS {
        println!("cargo:rustc-link-lib={lib}_static");
    }
    println!("cargo:rustc-link-lib=vcomp");
}

#[cfg(not(all(target_os = "windows", target_env = "msvc")))]
fn link(root: Option<&str>) {
    if let Some(root) = root {
        println!("cargo:rustc-link-search={root}/lib");
    }
    println!("cargo:rustc-link-search=/usr/local/lib");
    let kind = if env::var_os("GRIDFLOW_KLU_STATIC").is_some() {
        "static="
    } else {
        ""
    };
    for lib in KLU_LIBS {
        println!("cargo:rustc-link-lib={kind}{lib}");
    }
}

fn main() {
    println!("cargo:rerun-if-changed=wrapper.h");
    println!("cargo:rerun-if-env-changed=SUITESPARSE_DIR");
    println!("cargo:rerun-if-env-changed=GRIDFLOW_KLU_STATIC");

    let root = env::var("SUITESPARSE_DIR").ok().filter(|s| !s.is_empty());
    link(root.as_deref());

    let mut builder = bindgen::Builder::default()
        .header("wrapper.h")
        .allowlist_function("klu_l_.*")
        .allowlist_type("klu_l_.*")
        .derive_default(true)
        .parse_callbacks(Box::new(bindgen::CargoCallbacks::new()));
    for dir in include_dirs(root.as_deref()) {
        builder = builder.clang_arg(format!("-I{dir}"));
    }
    let bindings = builder.generate().expect("Unable to generate KLU bindings");

    let out_path = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    bindings
        .write_to_file(out_path.join("bindings.rs"))
        .expect("Couldn't write bindings!");
}
