//! Metadata object: only the aspect-ratio records are interpreted.

use tracing::trace;

use super::parser::HeaderBuilder;
use crate::cursor::BinaryCursor;
use crate::Result;

pub(super) fn parse_metadata(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    let mut cur = BinaryCursor::new(body);
    let records = cur.read_u16()?;

    for _ in 0..records {
        let _index = cur.read_u16()?;
        let stream = cur.read_u16()? & 0x7F;
        let name_len = cur.read_u16()? as usize;
        let _data_type = cur.read_u16()?;
        let mut data_len = cur.read_u32()? as usize;

        let slot = builder.stream_id(stream);
        match slot {
            Some(index) if data_len >= 4 => {
                let name = builder.codec.decode(cur.read_bytes(name_len)?);
                let aspect = &mut builder.slots[index].aspect_ratio;
                match name.as_str() {
                    "AspectRatioX" => {
                        aspect.x = cur.read_u32()?;
                        data_len -= 4;
                    }
                    "AspectRatioY" => {
                        aspect.y = cur.read_u32()?;
                        data_len -= 4;
                    }
                    _ => trace!(stream, name = %name, "ignoring metadata record"),
                }
                cur.skip(data_len)?;
            }
            _ => cur.skip(name_len + data_len)?,
        }
    }
    Ok(())
}
