use std::env;
use std::path::Path;

// pnet needs Packet.lib from the Npcap SDK when targeting Windows.
fn main() {
    println!("cargo:rerun-if-env-changed=NPCAP_SDK_PATH");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    let sdk_path = env::var("NPCAP_SDK_PATH").unwrap_or_else(|_| "C:\\Program Files\\Npcap".to_string());
    if Path::new(&sdk_path).exists() {
        println!("cargo:rustc-link-search=native={}\\Lib\\x64", sdk_path);
        println!("cargo:rustc-link-lib=static=Packet");
    } else {
        println!("cargo:warning=Npcap SDK not found at {}.", sdk_path);
        println!("cargo:warning=Set NPCAP_SDK_PATH to the Npcap SDK directory to enable ARP kick on Windows.");
    }
}
