use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{ArrayD, Dimension, IxDyn};

use elastix_core::locate::ElastixExecutables;
use elastix_core::progress::ProgressReporter;

/// A 3D test volume with a bright block in the middle.
pub fn test_volume(shape: &[usize]) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(shape), |idx| {
        let inside = idx
            .slice()
            .iter()
            .zip(shape)
            .all(|(&i, &n)| i >= n / 4 && i < n - n / 4);
        if inside {
            1.0
        } else {
            0.1
        }
    })
}

/// Reporter that records every event as a string.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ProgressReporter for Recorder {
    fn begin(&self, tool: &str) {
        self.push(format!("begin {}", tool));
    }

    fn resolution(&self, level: u32) {
        self.push(format!("resolution {}", level));
    }

    fn iteration(&self, level: u32, iteration: u32) {
        self.push(format!("iteration {} {}", level, iteration));
    }

    fn line(&self, line: &str) {
        self.push(format!("line {}", line));
    }

    fn error_line(&self, line: &str) {
        self.push(format!("error {}", line));
    }

    fn finish(&self) {
        self.push("finish".to_string());
    }
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Shell snippet parsing the flags elastix and transformix accept.
const PARSE_ARGS: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -m) moving="$2"; shift 2 ;;
    -f) fixed="$2"; shift 2 ;;
    -in) input="$2"; shift 2 ;;
    -out) out="$2"; shift 2 ;;
    -p) params="$2"; shift 2 ;;
    -tp) tp="$2"; shift 2 ;;
    -def) def="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;

/// Stand-in for elastix: prints progress-like output, copies the moving
/// image to `result.0.mhd` and writes a transform parameter file.
pub fn fake_elastix_body() -> String {
    format!(
        r#"{PARSE_ARGS}
echo "elastix is started"
echo "Resolution: 0"
printf '1\t-0.52\t1.0\n'
printf '2\t-0.61\t1.0\n'
echo "Resolution: 1"
printf '1\t-0.70\t0.5\n'
cp "$moving" "$out/result.0.mhd"
cat > "$out/TransformParameters.0.txt" <<EOT
// Fake transform
(Transform "BSplineTransform")
(NumberOfParameters 4)
(TransformParameters 0.0 0.0 0.0 0.0)
(HowToCombineTransforms "Compose")
EOT
echo "Total time elapsed: 0.1s"
exit 0
"#
    )
}

/// Stand-in for elastix that fails with `message`.
pub fn failing_elastix_body(message: &str) -> String {
    format!(
        r#"{PARSE_ARGS}
echo "Reading parameter file"
echo "{message}"
echo "stderr: {message}" 1>&2
exit 1
"#
    )
}

/// Stand-in for transformix. With `-def all` it writes an all-zero vector
/// field of size `dim_size` (x-y-z order) with `channels` components; with
/// `-in` it copies the input to `result.mhd`.
pub fn fake_transformix_body(dim_size: &[usize], channels: usize) -> String {
    let dims = dim_size
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let bytes = dim_size.iter().product::<usize>() * channels * 4;
    format!(
        r#"{PARSE_ARGS}
echo "transformix is started"
if [ -n "$input" ]; then
  cp "$input" "$out/result.mhd"
  exit 0
fi
cat > "$out/deformationField.mhd" <<EOT
ObjectType = Image
NDims = {ndims}
BinaryData = True
BinaryDataByteOrderMSB = False
DimSize = {dims}
ElementNumberOfChannels = {channels}
ElementType = MET_FLOAT
ElementDataFile = deformationField.raw
EOT
head -c {bytes} /dev/zero > "$out/deformationField.raw"
exit 0
"#,
        ndims = dim_size.len(),
    )
}

/// Install fake tools in `dir` and return their paths.
#[cfg(unix)]
pub fn install_fake_tools(dir: &Path, elastix_body: &str, transformix_body: &str) -> ElastixExecutables {
    let elastix = dir.join("elastix");
    let transformix = dir.join("transformix");
    write_script(&elastix, elastix_body);
    write_script(&transformix, transformix_body);
    ElastixExecutables {
        elastix,
        transformix,
    }
}

/// Files left in `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default();
    files.sort();
    files
}
