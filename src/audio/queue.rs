use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::time::Duration;
use tracing::{debug, info};

use crate::{error::PlaybackError, sources::TrackMetadata};

/// Entrada resuelta y lista para reproducir
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub metadata: TrackMetadata,
    /// Nombre de la fuente que la resolvió
    pub source_name: &'static str,
    /// Color RGB con el que se muestra la fuente
    pub source_color: u32,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(
        metadata: TrackMetadata,
        source_name: &'static str,
        source_color: u32,
        requested_by: UserId,
    ) -> Self {
        Self {
            metadata,
            source_name,
            source_color,
            requested_by,
            added_at: Utc::now(),
        }
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn duration(&self) -> Option<Duration> {
        self.metadata.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Queue,
    Track,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Queue => "queue",
            RepeatMode::Track => "track",
        }
    }
}

impl std::str::FromStr for RepeatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(RepeatMode::Off),
            "queue" => Ok(RepeatMode::Queue),
            "track" | "song" => Ok(RepeatMode::Track),
            other => Err(format!("modo de repetición desconocido: {}", other)),
        }
    }
}

/// Cola FIFO por guild con permutación aleatoria opcional.
///
/// `items` conserva el orden de inserción. Cuando el modo aleatorio está
/// activo, `order` es una permutación de `0..items.len()` que define el orden
/// de reproducción; toda lectura o borrado por índice pasa por ella. Ambas
/// estructuras solo se modifican juntas dentro de los métodos de este tipo.
#[derive(Debug)]
pub struct QueueStore {
    items: Vec<QueueEntry>,
    order: Option<Vec<usize>>,
    max_size: usize,
}

impl QueueStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: Vec::new(),
            order: None,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_shuffled(&self) -> bool {
        self.order.is_some()
    }

    /// Agrega una entrada al final de la cola y devuelve el nuevo tamaño
    pub fn add(&mut self, entry: QueueEntry) -> Result<usize, PlaybackError> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", entry.title());
        let real = self.items.len();
        self.items.push(entry);

        // Con aleatorio activo la entrada nueva cae en un lugar al azar
        if let Some(order) = self.order.as_mut() {
            let slot = rand::thread_rng().gen_range(0..=order.len());
            order.insert(slot, real);
        }
        Ok(self.items.len())
    }

    /// Reinserta la canción terminada al final (repetición de cola).
    ///
    /// Siempre queda última en el orden de reproducción, también con
    /// aleatorio activo. No aplica el límite de tamaño: la entrada ya
    /// ocupaba un lugar.
    pub fn requeue(&mut self, entry: QueueEntry) {
        debug!("🔁 Reinsertando al final: {}", entry.title());
        let real = self.items.len();
        self.items.push(entry);

        if let Some(order) = self.order.as_mut() {
            order.push(real);
        }
    }

    /// Elimina la entrada en la posición lógica `index` (orden de reproducción)
    pub fn remove(&mut self, index: usize) -> Result<QueueEntry, PlaybackError> {
        if index >= self.items.len() {
            return Err(PlaybackError::InvalidIndex(index));
        }

        let real = match self.order.as_mut() {
            Some(order) => {
                let real = order.remove(index);
                for position in order.iter_mut() {
                    if *position > real {
                        *position -= 1;
                    }
                }
                real
            }
            None => index,
        };

        let removed = self.items.remove(real);
        debug!("❌ Eliminado de la cola en posición {}: {}", index, removed.title());
        Ok(removed)
    }

    /// Vacía la cola y la permutación; devuelve cuántas entradas había
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        if let Some(order) = self.order.as_mut() {
            order.clear();
        }
        info!("🗑️ Cola limpiada ({} canciones)", removed);
        removed
    }

    pub fn get(&self, index: usize) -> Option<&QueueEntry> {
        let real = match &self.order {
            Some(order) => *order.get(index)?,
            None => index,
        };
        self.items.get(real)
    }

    /// Saca la siguiente entrada según el orden de reproducción
    pub fn pop_next(&mut self) -> Option<QueueEntry> {
        if self.items.is_empty() {
            return None;
        }
        self.remove(0).ok()
    }

    /// Activa o desactiva el modo aleatorio generando una permutación nueva
    pub fn set_shuffle(&mut self, enabled: bool) {
        if enabled {
            let mut order: Vec<usize> = (0..self.items.len()).collect();
            order.shuffle(&mut rand::thread_rng());
            self.order = Some(order);
            info!("🔀 Modo aleatorio activado");
        } else {
            self.order = None;
            info!("➡️ Modo aleatorio desactivado");
        }
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let enabled = !self.is_shuffled();
        self.set_shuffle(enabled);
        enabled
    }

    /// Recorre la cola en orden de reproducción
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        (0..self.items.len()).filter_map(move |index| self.get(index))
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.iter().cloned().collect()
    }

    /// Verifica que la permutación siga indexando exactamente la cola
    pub fn is_consistent(&self) -> bool {
        match &self.order {
            None => true,
            Some(order) => {
                if order.len() != self.items.len() {
                    return false;
                }
                let mut seen = vec![false; self.items.len()];
                order.iter().all(|&real| {
                    real < seen.len() && !std::mem::replace(&mut seen[real], true)
                })
            }
        }
    }
}

/// Vista inmutable de la cola para el comando `/queue`
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub now_playing: Option<QueueEntry>,
    pub entries: Vec<QueueEntry>,
    pub repeat: RepeatMode,
    pub shuffle: bool,
}

impl QueueSnapshot {
    pub fn total_items(&self) -> usize {
        self.entries.len()
    }

    pub fn total_duration(&self) -> Duration {
        let queued: Duration = self.entries.iter().filter_map(|e| e.duration()).sum();
        let current = self
            .now_playing
            .as_ref()
            .and_then(|e| e.duration())
            .unwrap_or_default();
        queued + current
    }

    /// Obtiene una página específica de la cola (1-indexada)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_pages = self.entries.len().div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.entries.len());

        QueuePage {
            items: self.entries[start..end].to_vec(),
            first_position: start + 1,
            current_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<QueueEntry>,
    /// Posición (1-indexada) del primer elemento de la página
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(title: &str) -> QueueEntry {
        QueueEntry::new(
            TrackMetadata::new(title, format!("https://example.com/{title}")),
            "test",
            0x00ff00,
            UserId::new(1),
        )
    }

    fn titles(queue: &QueueStore) -> Vec<String> {
        queue.iter().map(|e| e.title().to_string()).collect()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = QueueStore::new(10);
        queue.add(entry("a")).unwrap();
        queue.add(entry("b")).unwrap();
        queue.add(entry("c")).unwrap();

        assert_eq!(queue.pop_next().unwrap().title(), "a");
        assert_eq!(titles(&queue), vec!["b", "c"]);
    }

    #[test]
    fn test_queue_full() {
        let mut queue = QueueStore::new(1);
        queue.add(entry("a")).unwrap();
        assert_eq!(queue.add(entry("b")), Err(PlaybackError::QueueFull { max: 1 }));

        // La repetición de cola no respeta el límite
        queue.requeue(entry("b"));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_remove_out_of_range() {
        let mut queue = QueueStore::new(10);
        queue.add(entry("a")).unwrap();
        assert_eq!(queue.remove(1), Err(PlaybackError::InvalidIndex(1)));
    }

    #[test]
    fn test_shuffle_remove_keeps_structures_in_sync() {
        let mut queue = QueueStore::new(100);
        for i in 0..20 {
            queue.add(entry(&i.to_string())).unwrap();
        }
        queue.set_shuffle(true);
        assert!(queue.is_consistent());

        while queue.len() > 0 {
            let index = queue.len() / 2;
            let expected = queue.get(index).unwrap().title().to_string();
            let before = queue.len();

            let removed = queue.remove(index).unwrap();

            assert_eq!(removed.title(), expected);
            assert_eq!(queue.len(), before - 1);
            assert!(queue.is_consistent());
        }
    }

    #[test]
    fn test_shuffle_add_and_requeue_stay_consistent() {
        let mut queue = QueueStore::new(100);
        queue.add(entry("a")).unwrap();
        queue.set_shuffle(true);
        queue.add(entry("b")).unwrap();
        queue.requeue(entry("c"));
        assert!(queue.is_consistent());

        let mut all = titles(&queue);
        all.sort();
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_requeue_under_shuffle_always_goes_last() {
        for _ in 0..200 {
            let mut queue = QueueStore::new(100);
            for title in ["a", "b", "c"] {
                queue.add(entry(title)).unwrap();
            }
            queue.set_shuffle(true);
            queue.requeue(entry("done"));

            assert!(queue.is_consistent());
            assert_eq!(queue.get(3).unwrap().title(), "done");
        }
    }

    #[test]
    fn test_toggle_shuffle_off_restores_insertion_order() {
        let mut queue = QueueStore::new(10);
        for title in ["a", "b", "c", "d"] {
            queue.add(entry(title)).unwrap();
        }
        assert!(queue.toggle_shuffle());
        assert!(!queue.toggle_shuffle());
        assert_eq!(titles(&queue), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_clear_empties_permutation() {
        let mut queue = QueueStore::new(10);
        queue.add(entry("a")).unwrap();
        queue.set_shuffle(true);
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_consistent());
        assert!(queue.is_shuffled());
        queue.add(entry("b")).unwrap();
        assert_eq!(queue.get(0).unwrap().title(), "b");
    }

    #[test]
    fn test_snapshot_pagination() {
        let snapshot = QueueSnapshot {
            now_playing: None,
            entries: (0..25).map(|i| entry(&i.to_string())).collect(),
            repeat: RepeatMode::Off,
            shuffle: false,
        };

        let page = snapshot.page(3, 10);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.first_position, 21);
        assert_eq!(page.items.len(), 5);

        // Páginas fuera de rango se ajustan
        assert_eq!(snapshot.page(0, 10).current_page, 1);
        assert_eq!(snapshot.page(9, 10).current_page, 3);
    }

    #[test]
    fn test_repeat_mode_parsing() {
        assert_eq!("Track".parse::<RepeatMode>(), Ok(RepeatMode::Track));
        assert_eq!("none".parse::<RepeatMode>(), Ok(RepeatMode::Off));
        assert!("forever".parse::<RepeatMode>().is_err());
    }
}
