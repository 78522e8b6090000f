//! Canned models for the `mock` provider.
//!
//! The coder replies with a standard-library-only script that draws a red
//! octagon with a white border, so an offline run needs nothing but a Python
//! interpreter. The reviewer approves whatever it is shown.

use loupe_models::ScriptedModel;

use crate::config::OFFLINE_MODEL;

/// Script returned by the offline coder.
pub const OFFLINE_SCRIPT: &str = r#"import base64
import math
import struct
import zlib

SIZE = 200
CENTER = SIZE / 2
OUTER = 90
INNER = 80


def inside(x, y, apothem):
    dx, dy = abs(x - CENTER), abs(y - CENTER)
    return max(dx, dy, (dx + dy) / math.sqrt(2)) <= apothem


def chunk(tag, data):
    body = tag + data
    return struct.pack(">I", len(data)) + body + struct.pack(">I", zlib.crc32(body) & 0xFFFFFFFF)


rows = []
for y in range(SIZE):
    row = bytearray([0])
    for x in range(SIZE):
        if inside(x, y, INNER):
            row.extend((200, 16, 46))
        elif inside(x, y, OUTER):
            row.extend((255, 255, 255))
        else:
            row.extend((235, 235, 235))
    rows.append(bytes(row))

png = b"\x89PNG\r\n\x1a\n"
png += chunk(b"IHDR", struct.pack(">IIBBBBB", SIZE, SIZE, 8, 2, 0, 0, 0))
png += chunk(b"IDAT", zlib.compress(b"".join(rows)))
png += chunk(b"IEND", b"")
print(base64.b64encode(png).decode("ascii"))
"#;

/// Review returned by the offline reviewer.
pub const OFFLINE_REVIEW: &str = "ANALYSIS:
- Present attributes: regular octagon, red fill, white border
- Missing/incorrect attributes: none checked (offline review)
Verdict: APPROVE
Suggestions: none
Recommendation: TERMINATE";

/// Coder model that answers once with [`OFFLINE_SCRIPT`].
pub fn offline_coder() -> ScriptedModel {
    ScriptedModel::new(format!("{OFFLINE_MODEL}-coder"))
        .reply(format!("Here is the script:\n\n```python\n{OFFLINE_SCRIPT}```\n"))
}

/// Vision model that answers once with [`OFFLINE_REVIEW`].
pub fn offline_reviewer() -> ScriptedModel {
    ScriptedModel::new(format!("{OFFLINE_MODEL}-vision")).reply(OFFLINE_REVIEW)
}
