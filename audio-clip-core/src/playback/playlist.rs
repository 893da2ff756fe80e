use std::path::PathBuf;

use rand::seq::SliceRandom;

use crate::models::settings::PlaylistOrder;

/// Files of a playback button with a cursor.
///
/// Random order is shuffled once when the files or the order are set and
/// stays stable until one of them changes.
#[derive(Debug, Clone)]
pub struct Playlist {
    files: Vec<PathBuf>,
    order: PlaylistOrder,
    sequence: Vec<usize>,
    cursor: usize,
}

impl Playlist {
    pub fn new(files: Vec<PathBuf>, order: PlaylistOrder) -> Self {
        let mut playlist = Self {
            files,
            order,
            sequence: Vec::new(),
            cursor: 0,
        };
        playlist.rebuild();
        playlist
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn order(&self) -> PlaylistOrder {
        self.order
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Files in play order.
    pub fn ordered(&self) -> Vec<PathBuf> {
        self.sequence.iter().map(|&i| self.files[i].clone()).collect()
    }

    pub fn set_files(&mut self, files: Vec<PathBuf>) {
        if files != self.files {
            self.files = files;
            self.rebuild();
        }
    }

    pub fn set_order(&mut self, order: PlaylistOrder) {
        if order != self.order {
            self.order = order;
            self.rebuild();
        }
    }

    /// File at the cursor; advances and wraps to the start after the last.
    pub fn next(&mut self) -> Option<PathBuf> {
        let index = *self.sequence.get(self.cursor)?;
        self.cursor = (self.cursor + 1) % self.sequence.len();
        Some(self.files[index].clone())
    }

    /// Files left before the cursor wraps.
    pub fn remaining(&self) -> usize {
        self.sequence.len() - self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn rebuild(&mut self) {
        self.sequence = (0..self.files.len()).collect();
        if self.order == PlaylistOrder::Random {
            self.sequence.shuffle(&mut rand::rng());
        }
        self.cursor = 0;
    }
}
