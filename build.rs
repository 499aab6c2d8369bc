//! Build script for proto compilation.
//!
//! The generated wire types are committed to the repository, so this only
//! needs to run when `proto/plugin.proto` changes. Only message types are
//! generated: the testkit never serves the protocol over a transport.
//!
//! To regenerate: `cargo build --features regenerate-proto`
//!
//! The generated file will be placed in `src/generated.rs`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "regenerate-proto")]
    {
        let out_dir = std::path::PathBuf::from("src");
        tonic_prost_build::configure()
            .build_client(false)
            .build_server(false)
            .out_dir(&out_dir)
            .compile_protos(&["proto/plugin.proto"], &["proto"])?;

        let generated = out_dir.join("hemmer.plugin.v1.rs");
        let target = out_dir.join("generated.rs");
        if generated.exists() {
            std::fs::rename(generated, target)?;
        }
    }

    println!("cargo:rerun-if-changed=proto/plugin.proto");

    Ok(())
}
