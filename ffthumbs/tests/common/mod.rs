//! Fake ffmpeg/ffprobe binaries for integration tests.
//!
//! The fake ffmpeg looks at its `-i` argument: inputs containing `fail` exit
//! with an error, inputs containing `slow` block for a long time, anything
//! else prints two progress blocks and touches the last argument when it is
//! a `.jpg` path.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tempfile::TempDir;

const FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers"
    exit 0
fi

input=""
prev=""
last=""
for arg in "$@"; do
    if [ "$prev" = "-i" ]; then
        input="$arg"
    fi
    prev="$arg"
    last="$arg"
done

case "$input" in
    *fail*)
        echo "$input: Invalid data found when processing input" >&2
        exit 1
        ;;
    *slow*)
        exec sleep 30
        ;;
esac

sleep 0.1
echo "frame=10"
echo "out_time=00:00:01.000000"
echo "speed=2.00x"
echo "progress=continue"
echo "out_time=00:00:02.000000"
echo "progress=end"

case "$last" in
    *.jpg) : > "$last" ;;
esac
exit 0
"#;

const OLD_FFMPEG: &str = r#"#!/bin/sh
echo "ffmpeg version 4.4.2-0ubuntu0.22.04.1 Copyright (c) 2000-2021 the FFmpeg developers"
exit 0
"#;

const FFPROBE: &str = r#"#!/bin/sh
for arg in "$@"; do
    last="$arg"
done

case "$last" in
    *broken*) echo "N/A" ;;
    *) echo "120.000000" ;;
esac
exit 0
"#;

struct Fixtures {
    _dir: TempDir,
    ffmpeg: PathBuf,
    old_ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

// All scripts are written up front, before anything is executed.
static FIXTURES: LazyLock<Fixtures> = LazyLock::new(|| {
    let dir = tempfile::tempdir().expect("create fixture dir");
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        fs::write(&path, body).expect("write fake binary");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake binary");
        path
    };

    let ffmpeg = write("ffmpeg", FFMPEG);
    let old_ffmpeg = write("ffmpeg-old", OLD_FFMPEG);
    let ffprobe = write("ffprobe", FFPROBE);

    Fixtures {
        _dir: dir,
        ffmpeg,
        old_ffmpeg,
        ffprobe,
    }
});

pub fn fake_ffmpeg() -> &'static Path {
    &FIXTURES.ffmpeg
}

pub fn old_ffmpeg() -> &'static Path {
    &FIXTURES.old_ffmpeg
}

pub fn fake_ffprobe() -> &'static Path {
    &FIXTURES.ffprobe
}
