use glsl_to_spirv;
use std::env;
use std::fs::read_to_string;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

fn save_into_spirv(dir: &str, filename: &str, out_dir: &Path) {
    for (ext, ty) in vec![
        (".vert", glsl_to_spirv::ShaderType::Vertex),
        (".frag", glsl_to_spirv::ShaderType::Fragment),
    ]
    .into_iter()
    {
        let path = dir.to_owned() + "/" + filename + ext;
        println!("cargo:rerun-if-changed={}", path);

        let out_path = out_dir.join(filename.to_owned() + ext + ".spv");
        let code = read_to_string(&path).unwrap();
        let mut file = glsl_to_spirv::compile(&code, ty).unwrap_or_else(|err| {
            eprintln!("compile {}:", path);
            panic!("{}", err)
        });
        let mut buf = vec![];
        file.read_to_end(&mut buf).unwrap();

        let mut output = File::create(&out_path).unwrap();
        output.write_all(&buf).unwrap();
    }
}

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    save_into_spirv("src/data", "pretransformed", Path::new(&out_dir));
}
