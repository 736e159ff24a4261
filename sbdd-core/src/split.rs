// vim: tw=80
//! Cutting requests at chunk boundaries

use crate::{bio::Bio, types::*};

/// Split `bio` so that its head lies entirely within one chunk.
///
/// Returns the head and, if the request crossed a chunk boundary, the
/// remainder.  The remainder may itself cross further boundaries; the caller
/// resubmits it to peel off one chunk at a time.
pub fn split(bio: Bio, chunk: SectorT) -> (Bio, Option<Bio>) {
    let room = chunk - bio.sector() % chunk;
    if bio.sectors() <= room {
        (bio, None)
    } else {
        let (head, rest) = bio.split_at(room);
        (head, Some(rest))
    }
}
