use super::parser::HeaderBuilder;
use super::AsfContent;
use crate::cursor::BinaryCursor;
use crate::{Error, Result};

/// Content Description: five length-prefixed UTF-16LE strings.
pub(super) fn parse_content_description(builder: &mut HeaderBuilder, body: &[u8]) -> Result<()> {
    if body.len() < 10 {
        return Err(Error::malformed("content description object too short"));
    }
    let mut cur = BinaryCursor::new(body);

    let mut lengths = [0usize; 5];
    for len in &mut lengths {
        *len = cur.read_u16()? as usize;
    }

    let codec = builder.codec;
    let mut strings = lengths.into_iter().map(|len| -> Option<String> {
        if len == 0 {
            return None;
        }
        cur.read_bytes(len).ok().map(|raw| codec.decode(raw))
    });

    builder.content = Some(AsfContent {
        title: strings.next().flatten(),
        author: strings.next().flatten(),
        copyright: strings.next().flatten(),
        description: strings.next().flatten(),
        rating: strings.next().flatten(),
    });
    Ok(())
}
